use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A natural-language question over a database, together with the database schema.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct InferenceRequest {
    /// The question to translate into SQL
    #[schema(example = "How many singers do we have?")]
    pub question: String,

    /// Identifier of the database the question is asked against
    #[schema(example = "concert_singer")]
    pub db_id: String,

    /// Table names of the database
    #[schema(example = json!(["stadium", "singer"]))]
    pub table_names: Vec<String>,

    /// Column names of each table, positionally aligned with `table_names`
    #[schema(example = json!([["stadium_id", "location", "name"], ["singer_id", "name", "country"]]))]
    pub columns: Vec<Vec<String>>,
}

/// The generated SQL query.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct InferenceResponse {
    /// Decoded model output
    #[schema(example = "select count(*) from singer")]
    pub result: String,
}
