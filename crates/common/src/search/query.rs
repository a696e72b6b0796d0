//! Keyword query builder
//!
//! Produces the OpenSearch request body for a paper search:
//! - `multi_match` over boosted fields, or `match_all` for a blank query
//! - optional category filter (does not affect scoring)
//! - highlighting on title, abstract and authors
//! - date sort for "latest papers" and blank queries, relevance otherwise

use serde_json::{json, Value};

use super::SearchQuery;

/// Title matches weigh three times an author match, abstract twice.
pub const DEFAULT_FIELDS: &[&str] = &["title^3", "abstract^2", "authors^1"];

/// Fields copied from `_source` into each hit
pub const SOURCE_FIELDS: &[&str] = &[
    "arxiv_id",
    "title",
    "authors",
    "abstract",
    "categories",
    "published_date",
    "pdf_url",
];

#[derive(Debug, Clone)]
pub struct PaperQueryBuilder<'a> {
    query: &'a str,
    size: u32,
    from: u32,
    fields: Vec<String>,
    categories: &'a [String],
    track_total_hits: bool,
    latest_papers: bool,
}

impl<'a> PaperQueryBuilder<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            size: 10,
            from: 0,
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            categories: &[],
            track_total_hits: true,
            latest_papers: false,
        }
    }

    pub fn from_search(search: &'a SearchQuery) -> Self {
        Self::new(&search.query)
            .size(search.size)
            .from(search.from)
            .categories(&search.categories)
            .latest_papers(search.latest_papers)
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn from(mut self, from: u32) -> Self {
        self.from = from;
        self
    }

    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn categories(mut self, categories: &'a [String]) -> Self {
        self.categories = categories;
        self
    }

    pub fn track_total_hits(mut self, track: bool) -> Self {
        self.track_total_hits = track;
        self
    }

    pub fn latest_papers(mut self, latest: bool) -> Self {
        self.latest_papers = latest;
        self
    }

    fn is_blank(&self) -> bool {
        self.query.trim().is_empty()
    }

    pub fn build(&self) -> Value {
        let mut body = json!({
            "query": self.build_query(),
            "size": self.size,
            "from": self.from,
            "track_total_hits": self.track_total_hits,
            "_source": SOURCE_FIELDS,
            "highlight": Self::build_highlight(),
        });

        if let Some(sort) = self.build_sort() {
            body["sort"] = sort;
        }

        body
    }

    fn build_query(&self) -> Value {
        let must = if self.is_blank() {
            json!([{ "match_all": {} }])
        } else {
            json!([{
                "multi_match": {
                    "query": self.query,
                    "fields": self.fields,
                    "type": "best_fields",
                    "operator": "or",
                    "fuzziness": "AUTO",
                    "prefix_length": 2
                }
            }])
        };

        let mut bool_query = json!({ "must": must });
        if !self.categories.is_empty() {
            bool_query["filter"] = json!([{ "terms": { "categories": self.categories } }]);
        }

        json!({ "bool": bool_query })
    }

    fn build_highlight() -> Value {
        json!({
            "fields": {
                "title": {
                    "fragment_size": 0,
                    "number_of_fragments": 0
                },
                "abstract": {
                    "fragment_size": 150,
                    "number_of_fragments": 3,
                    "pre_tags": ["<mark>"],
                    "post_tags": ["</mark>"]
                },
                "authors": {
                    "fragment_size": 0,
                    "number_of_fragments": 0,
                    "pre_tags": ["<mark>"],
                    "post_tags": ["</mark>"]
                }
            },
            "require_field_match": false
        })
    }

    fn build_sort(&self) -> Option<Value> {
        if self.latest_papers || self.is_blank() {
            Some(json!([{ "published_date": { "order": "desc" } }, "_score"]))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_query_uses_boosted_multi_match() {
        let body = PaperQueryBuilder::new("transformer attention").build();

        let mm = &body["query"]["bool"]["must"][0]["multi_match"];
        assert_eq!(mm["query"], "transformer attention");
        assert_eq!(mm["fields"], json!(["title^3", "abstract^2", "authors^1"]));
        assert_eq!(mm["fuzziness"], "AUTO");
        assert_eq!(mm["prefix_length"], 2);
        assert!(body.get("sort").is_none());
        assert!(body["query"]["bool"].get("filter").is_none());
    }

    #[test]
    fn test_blank_query_matches_all_sorted_by_date() {
        let body = PaperQueryBuilder::new("   ").build();

        assert_eq!(body["query"]["bool"]["must"][0], json!({ "match_all": {} }));
        assert_eq!(body["sort"][0]["published_date"]["order"], "desc");
        assert_eq!(body["sort"][1], "_score");
    }

    #[test]
    fn test_category_filter_and_paging() {
        let categories = vec!["cs.AI".to_string(), "cs.LG".to_string()];
        let body = PaperQueryBuilder::new("agents")
            .categories(&categories)
            .size(25)
            .from(50)
            .latest_papers(true)
            .build();

        assert_eq!(
            body["query"]["bool"]["filter"][0]["terms"]["categories"],
            json!(["cs.AI", "cs.LG"])
        );
        assert_eq!(body["size"], 25);
        assert_eq!(body["from"], 50);
        assert_eq!(body["track_total_hits"], true);
        assert!(body.get("sort").is_some());
    }

    #[test]
    fn test_source_and_highlight_fields() {
        let body = PaperQueryBuilder::new("rag").build();

        assert_eq!(body["_source"].as_array().unwrap().len(), SOURCE_FIELDS.len());
        assert_eq!(body["highlight"]["fields"]["abstract"]["fragment_size"], 150);
        assert_eq!(body["highlight"]["fields"]["abstract"]["pre_tags"][0], "<mark>");
    }
}
