use crate::error::DbError;
use crate::manager::mysql::MySqlConnectionManager;
use model::core::value::Value;
use model::records::batch::RowBatch;

/// How a reader walks its table.
pub enum ReadPlan {
    /// Append `LIMIT/OFFSET` to a fixed base query. Used where no single
    /// ordering column exists; the base query orders by primary key.
    Paged { base_sql: String, params: Vec<Value> },
    /// Keyset pagination over one ordered column. `seed_sql` runs while
    /// there is no cursor yet; `next_sql` binds the cursor as its only
    /// parameter. Both embed their own ORDER BY and LIMIT.
    Keyset {
        seed_sql: String,
        next_sql: String,
        cursor_column: String,
        cursor: Option<Value>,
    },
}

/// Finite, forward-only batch stream: call [`read_batch`] until it
/// returns `None`. There is no rewind and no random access; a new copy
/// builds a new reader.
///
/// [`read_batch`]: MySqlBatchReader::read_batch
pub struct MySqlBatchReader<'a> {
    manager: &'a mut MySqlConnectionManager,
    plan: ReadPlan,
    batch_size: u32,
    offset: u64,
    done: bool,
}

impl<'a> MySqlBatchReader<'a> {
    pub fn new(manager: &'a mut MySqlConnectionManager, plan: ReadPlan, batch_size: u32) -> Self {
        MySqlBatchReader {
            manager,
            plan,
            batch_size,
            offset: 0,
            done: false,
        }
    }

    /// Current keyset cursor; after exhaustion this is the high-water
    /// mark of everything read.
    pub fn cursor(&self) -> Option<&Value> {
        match &self.plan {
            ReadPlan::Keyset { cursor, .. } => cursor.as_ref(),
            ReadPlan::Paged { .. } => None,
        }
    }

    pub async fn read_batch(&mut self) -> Result<Option<RowBatch>, DbError> {
        if self.done {
            return Ok(None);
        }

        let batch = match &self.plan {
            ReadPlan::Paged { base_sql, params } => {
                let sql = paged_sql(base_sql, self.batch_size, self.offset);
                self.manager.query(&sql, params).await?
            }
            ReadPlan::Keyset {
                seed_sql,
                next_sql,
                cursor,
                ..
            } => match cursor {
                Some(mark) => {
                    let params = [mark.clone()];
                    self.manager.query(next_sql, &params).await?
                }
                None => self.manager.query(seed_sql, &[]).await?,
            },
        };

        if batch.is_empty() {
            self.done = true;
            return Ok(None);
        }

        let fetched = batch.len() as u64;
        if fetched < u64::from(self.batch_size) {
            self.done = true;
        }
        self.offset += fetched;

        if let ReadPlan::Keyset {
            cursor,
            cursor_column,
            ..
        } = &mut self.plan
        {
            let next = batch.last_value(cursor_column).filter(|v| !v.is_null());
            // A full batch that does not move the cursor would refetch
            // the same rows forever: the column holds more NULLs or
            // duplicates than one batch can step over.
            if !self.done && (next.is_none() || next == *cursor) {
                return Err(DbError::Write(format!(
                    "incremental cursor `{cursor_column}` did not advance"
                )));
            }
            if next.is_some() {
                *cursor = next;
            }
        }

        Ok(Some(batch))
    }
}

fn paged_sql(base_sql: &str, batch_size: u32, offset: u64) -> String {
    format!("{base_sql} LIMIT {batch_size} OFFSET {offset}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_appended_to_the_base_query() {
        assert_eq!(
            paged_sql("SELECT `PatNum` FROM `patient` ORDER BY `PatNum`", 2000, 4000),
            "SELECT `PatNum` FROM `patient` ORDER BY `PatNum` LIMIT 2000 OFFSET 4000"
        );
    }
}
