//! Paper entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "papers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Upsert key for ingestion
    #[sea_orm(column_type = "Text", unique)]
    pub arxiv_id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// JSON array of author names
    #[sea_orm(column_type = "Json")]
    pub authors: Json,

    #[sea_orm(column_name = "abstract", column_type = "Text")]
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    /// JSON array of arXiv categories, e.g. `["cs.AI", "cs.LG"]`
    #[sea_orm(column_type = "Json")]
    pub categories: Json,

    pub published_date: DateTimeWithTimeZone,

    #[sea_orm(column_type = "Text")]
    pub pdf_url: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub raw_text: Option<String>,

    #[sea_orm(column_type = "Json", nullable)]
    pub sections: Option<Json>,

    #[sea_orm(column_type = "Text", nullable)]
    pub parser_used: Option<String>,

    #[sea_orm(column_type = "Json", nullable)]
    pub parser_metadata: Option<Json>,

    pub pdf_processed: bool,

    pub pdf_processing_date: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Authors as plain strings. Non-string entries are skipped.
    pub fn author_names(&self) -> Vec<String> {
        json_strings(&self.authors)
    }

    pub fn category_names(&self) -> Vec<String> {
        json_strings(&self.categories)
    }
}

fn json_strings(value: &Json) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
