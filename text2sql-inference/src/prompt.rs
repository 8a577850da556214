//! Schema linearization.
//!
//! The text-to-SQL checkpoints served by the node were fine-tuned on inputs of
//! the form
//!
//! ```text
//! question | db_id | table1: col1, col2 | table2: col3, col4
//! ```
//!
//! so every request is flattened into exactly that shape before tokenization.

use thiserror::Error;

/// Separator between the question, the database id and each table.
pub const SEGMENT_SEPARATOR: &str = " | ";
/// Separator between a table name and its column list.
pub const TABLE_SEPARATOR: &str = ": ";
/// Separator between two column names of the same table.
pub const COLUMN_SEPARATOR: &str = ", ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("Got {tables} table names but {columns} column lists, they must be positionally aligned")]
    MisalignedSchema { tables: usize, columns: usize },
}

/// Flattens a question and its database schema into the model input string.
///
/// `columns[i]` holds the column names of `table_names[i]`. Fields are copied
/// verbatim, without trimming or escaping.
pub fn linearize_schema<Q, D, T, C>(
    question: Q,
    db_id: D,
    table_names: &[T],
    columns: &[Vec<C>],
) -> Result<String, PromptError>
where
    Q: AsRef<str>,
    D: AsRef<str>,
    T: AsRef<str>,
    C: AsRef<str>,
{
    if table_names.len() != columns.len() {
        return Err(PromptError::MisalignedSchema {
            tables: table_names.len(),
            columns: columns.len(),
        });
    }

    let mut prompt = format!(
        "{}{SEGMENT_SEPARATOR}{}",
        question.as_ref(),
        db_id.as_ref()
    );
    for (table_name, table_columns) in table_names.iter().zip(columns) {
        prompt.push_str(SEGMENT_SEPARATOR);
        prompt.push_str(table_name.as_ref());
        prompt.push_str(TABLE_SEPARATOR);
        for (index, column) in table_columns.iter().enumerate() {
            if index > 0 {
                prompt.push_str(COLUMN_SEPARATOR);
            }
            prompt.push_str(column.as_ref());
        }
    }
    Ok(prompt)
}
