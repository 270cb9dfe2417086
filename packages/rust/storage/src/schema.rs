//! Analytics-store table schemas.
//!
//! Every table opens with the same five identity columns. Rows are built as
//! loose JSON records and projected onto a schema with [`TableSchema::select`]
//! before they are validated and written.

use serde::Serialize;
use serde_json::Value;

use refinery_shared::Record;

/// Column type, named after the analytics store's types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Timestamp,
    Date,
    Integer,
    Float,
    Boolean,
}

/// Column mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Required,
    Nullable,
}

/// One column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: Mode,
}

const fn required(name: &'static str, field_type: FieldType) -> SchemaField {
    SchemaField {
        name,
        field_type,
        mode: Mode::Required,
    }
}

const fn nullable(name: &'static str, field_type: FieldType) -> SchemaField {
    SchemaField {
        name,
        field_type,
        mode: Mode::Nullable,
    }
}

/// A named list of columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    /// Schema name; the concrete table name comes from config.
    pub kind: &'static str,
    pub fields: &'static [SchemaField],
}

impl TableSchema {
    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    /// Project `record` onto this schema's columns (absent columns become null).
    pub fn select(&self, record: &Record) -> Record {
        let mut row = Record::new();
        for field in self.fields {
            let value = record.get(field.name).cloned().unwrap_or(Value::Null);
            row.insert(field.name.to_string(), value);
        }
        row
    }

    /// Check required columns and value types.
    pub fn validate(&self, row: &Record) -> std::result::Result<(), String> {
        for field in self.fields {
            let value = row.get(field.name).unwrap_or(&Value::Null);
            if value.is_null() {
                if field.mode == Mode::Required {
                    return Err(format!("missing required field '{}'", field.name));
                }
                continue;
            }
            // Mirrors the store's JSON coercions: numbers into STRING, numeric
            // strings into INTEGER/FLOAT.
            let ok = match field.field_type {
                FieldType::String => value.is_string() || value.is_number(),
                FieldType::Timestamp | FieldType::Date => value.is_string(),
                FieldType::Integer => match value {
                    Value::Number(n) => {
                        n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
                    }
                    Value::String(s) => s.parse::<i64>().is_ok(),
                    _ => false,
                },
                FieldType::Float => match value {
                    Value::Number(_) => true,
                    Value::String(s) => s.parse::<f64>().is_ok(),
                    _ => false,
                },
                FieldType::Boolean => value.is_boolean(),
            };
            if !ok {
                return Err(format!(
                    "field '{}' expected {:?}, got {value}",
                    field.name, field.field_type
                ));
            }
        }
        Ok(())
    }
}

macro_rules! identity {
    () => {
        [
            required("refinery_id", FieldType::String),
            required("refined_at", FieldType::Timestamp),
            required("refined_date", FieldType::Date),
            required("domain", FieldType::String),
            required("url", FieldType::String),
        ]
    };
}

const fn concat<const A: usize, const B: usize, const N: usize>(
    a: [SchemaField; A],
    b: [SchemaField; B],
) -> [SchemaField; N] {
    let mut out = [required("", FieldType::String); N];
    let mut i = 0;
    while i < A {
        out[i] = a[i];
        i += 1;
    }
    let mut j = 0;
    while j < B {
        out[A + j] = b[j];
        j += 1;
    }
    out
}

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

const MOBILE_FRIENDLY_FIELDS: [SchemaField; 6] =
    concat(identity!(), [required("test_results", FieldType::String)]);

/// Mobile-friendly test results.
pub const MOBILE_FRIENDLY_SCHEMA: TableSchema = TableSchema {
    kind: "mobile_friendly",
    fields: &MOBILE_FRIENDLY_FIELDS,
};

const TAGS_HISTORY_FIELDS: [SchemaField; 6] =
    concat(identity!(), [required("tag", FieldType::String)]);

/// One row per enrichment-API company tag.
pub const TAGS_HISTORY_SCHEMA: TableSchema = TableSchema {
    kind: "tags_history",
    fields: &TAGS_HISTORY_FIELDS,
};

const TECH_HISTORY_FIELDS: [SchemaField; 6] =
    concat(identity!(), [required("tech", FieldType::String)]);

/// One row per enrichment-API company technology.
pub const TECH_HISTORY_SCHEMA: TableSchema = TableSchema {
    kind: "tech_history",
    fields: &TECH_HISTORY_FIELDS,
};

const CRAWLER_TECH_FIELDS: [SchemaField; 7] = concat(
    identity!(),
    [
        required("asset", FieldType::String),
        required("type", FieldType::String),
    ],
);

/// One row per WordPress theme/plugin seen by the crawler.
pub const CRAWLER_TECH_SCHEMA: TableSchema = TableSchema {
    kind: "crawler_tech",
    fields: &CRAWLER_TECH_FIELDS,
};

const CRAWLER_FIELDS: [SchemaField; 20] = [
    required("refinery_id", FieldType::String),
    required("refined_at", FieldType::Timestamp),
    required("refined_date", FieldType::Date),
    nullable("sfdc_lead_id", FieldType::String),
    nullable("sfdc_contact_id", FieldType::String),
    required("domain", FieldType::String),
    required("url", FieldType::String),
    nullable("all_links", FieldType::String),
    nullable("internal_links", FieldType::String),
    nullable("external_links", FieldType::String),
    nullable("href_emails", FieldType::String),
    nullable("href_phones", FieldType::String),
    nullable("href_socials", FieldType::String),
    nullable("meta_keywords", FieldType::String),
    nullable("meta_description", FieldType::String),
    nullable("tier1_classification", FieldType::String),
    nullable("tier2_classification", FieldType::String),
    nullable("tier3_classification", FieldType::String),
    nullable("classification_confidence", FieldType::Float),
    nullable("html_string", FieldType::String),
];

/// Crawler extraction results.
pub const CRAWLER_SCHEMA: TableSchema = TableSchema {
    kind: "crawler",
    fields: &CRAWLER_FIELDS,
};

const CLEARBIT_PERSON_FIELDS: [SchemaField; 56] = [
    required("refinery_id", FieldType::String),
    required("refined_at", FieldType::Timestamp),
    required("refined_date", FieldType::Date),
    nullable("sfdc_lead_id", FieldType::String),
    nullable("sfdc_contact_id", FieldType::String),
    nullable("domain", FieldType::String),
    nullable("url", FieldType::String),
    nullable("clearbit_person_id", FieldType::String),
    nullable("clearbit_indexed_at", FieldType::Timestamp),
    nullable("full_name", FieldType::String),
    nullable("first_name", FieldType::String),
    nullable("last_name", FieldType::String),
    nullable("email", FieldType::String),
    nullable("location", FieldType::String),
    nullable("time_zone", FieldType::String),
    nullable("utc_offset", FieldType::Integer),
    nullable("city", FieldType::String),
    nullable("state", FieldType::String),
    nullable("state_code", FieldType::String),
    nullable("country", FieldType::String),
    nullable("country_code", FieldType::String),
    nullable("latitude", FieldType::Float),
    nullable("longitude", FieldType::Float),
    nullable("bio", FieldType::String),
    nullable("site", FieldType::String),
    nullable("avatar", FieldType::String),
    nullable("employment_domain", FieldType::String),
    nullable("employment_name", FieldType::String),
    nullable("employment_title", FieldType::String),
    nullable("employment_role", FieldType::String),
    nullable("employment_seniority", FieldType::String),
    nullable("facebook_handle", FieldType::String),
    nullable("github_handle", FieldType::String),
    nullable("github_avatar", FieldType::String),
    nullable("github_company", FieldType::String),
    nullable("github_blog", FieldType::String),
    nullable("github_followers", FieldType::Integer),
    nullable("github_following", FieldType::Integer),
    nullable("twitter_handle", FieldType::String),
    nullable("twitter_id", FieldType::Integer),
    nullable("twitter_bio", FieldType::String),
    nullable("twitter_followers", FieldType::Integer),
    nullable("twitter_following", FieldType::Integer),
    nullable("twitter_location", FieldType::String),
    nullable("twitter_site", FieldType::String),
    nullable("twitter_avatar", FieldType::String),
    nullable("linkedin_handle", FieldType::String),
    nullable("googleplus_handle", FieldType::String),
    nullable("gravatar_handle", FieldType::String),
    nullable("gravatar_url_titles", FieldType::String),
    nullable("gravatar_urls", FieldType::String),
    nullable("gravatar_avatar", FieldType::String),
    nullable("gravatar_avatar_types", FieldType::String),
    nullable("gravatar_avatar_urls", FieldType::String),
    nullable("fuzzy_match", FieldType::Boolean),
    nullable("is_email_provider", FieldType::Boolean),
];

/// Flattened enrichment-API person.
pub const CLEARBIT_PERSON_SCHEMA: TableSchema = TableSchema {
    kind: "clearbit_person",
    fields: &CLEARBIT_PERSON_FIELDS,
};

const CLEARBIT_COMPANY_FIELDS: [SchemaField; 65] = [
    required("refinery_id", FieldType::String),
    required("refined_at", FieldType::Timestamp),
    required("refined_date", FieldType::Date),
    nullable("sfdc_lead_id", FieldType::String),
    nullable("sfdc_contact_id", FieldType::String),
    nullable("domain", FieldType::String),
    nullable("url", FieldType::String),
    nullable("clearbit_company_id", FieldType::String),
    nullable("clearbit_indexed_at", FieldType::Timestamp),
    nullable("company_name", FieldType::String),
    nullable("legal_name", FieldType::String),
    nullable("company_domain", FieldType::String),
    nullable("domain_aliases", FieldType::String),
    nullable("phone_numbers", FieldType::String),
    nullable("email_addresses", FieldType::String),
    nullable("industry", FieldType::String),
    nullable("industry_group", FieldType::String),
    nullable("sub_industry", FieldType::String),
    nullable("sector", FieldType::String),
    nullable("sic_code", FieldType::String),
    nullable("naics_code", FieldType::String),
    nullable("description", FieldType::String),
    nullable("year_founded", FieldType::Integer),
    nullable("location", FieldType::String),
    nullable("street_number", FieldType::String),
    nullable("street_name", FieldType::String),
    nullable("sub_premise", FieldType::String),
    nullable("city", FieldType::String),
    nullable("state", FieldType::String),
    nullable("state_code", FieldType::String),
    nullable("postal_code", FieldType::String),
    nullable("country", FieldType::String),
    nullable("country_code", FieldType::String),
    nullable("latitude", FieldType::Float),
    nullable("longitude", FieldType::Float),
    nullable("time_zone", FieldType::String),
    nullable("utc_offset", FieldType::Integer),
    nullable("company_phone", FieldType::String),
    nullable("number_of_employees", FieldType::Integer),
    nullable("number_of_employees_range", FieldType::String),
    nullable("fiscal_year_ends", FieldType::Integer),
    nullable("market_cap", FieldType::Integer),
    nullable("total_raised", FieldType::Integer),
    nullable("company_type", FieldType::String),
    nullable("ticker_symbol", FieldType::String),
    nullable("tax_ein", FieldType::String),
    nullable("annual_revenue", FieldType::Integer),
    nullable("estimated_annual_revenue", FieldType::String),
    nullable("company_logo", FieldType::String),
    nullable("crunchbase_handle", FieldType::String),
    nullable("alexa_us_rank", FieldType::Integer),
    nullable("alexa_global_rank", FieldType::Integer),
    nullable("parent_domain", FieldType::String),
    nullable("facebook_handle", FieldType::String),
    nullable("facebook_likes", FieldType::Integer),
    nullable("linkedin_handle", FieldType::String),
    nullable("twitter_handle", FieldType::String),
    nullable("twitter_avatar", FieldType::String),
    nullable("twitter_bio", FieldType::String),
    nullable("twitter_follower_count", FieldType::Integer),
    nullable("twitter_following_count", FieldType::Integer),
    nullable("twitter_id", FieldType::String),
    nullable("twitter_location", FieldType::String),
    nullable("twitter_site_url", FieldType::String),
    nullable("is_email_provider", FieldType::Boolean),
];

/// Flattened enrichment-API company.
pub const CLEARBIT_COMPANY_SCHEMA: TableSchema = TableSchema {
    kind: "clearbit_company",
    fields: &CLEARBIT_COMPANY_FIELDS,
};

const WORDPRESS_PLUGIN_FIELDS: [SchemaField; 9] = concat(
    identity!(),
    [
        required("plugin", FieldType::String),
        nullable("plugin_name", FieldType::String),
        nullable("plugin_description", FieldType::String),
        nullable("plugin_tags", FieldType::String),
    ],
);

/// Metadata for each WordPress plugin found on a site.
pub const WORDPRESS_PLUGIN_SCHEMA: TableSchema = TableSchema {
    kind: "wordpress_plugins",
    fields: &WORDPRESS_PLUGIN_FIELDS,
};

const EMAIL_PROVIDER_FIELDS: [SchemaField; 7] = concat(
    identity!(),
    [
        required("email_providers", FieldType::String),
        required("mx_records", FieldType::String),
    ],
);

/// MX lookup results.
pub const EMAIL_PROVIDER_SCHEMA: TableSchema = TableSchema {
    kind: "email_providers",
    fields: &EMAIL_PROVIDER_FIELDS,
};

/// All schemas, for table creation in the local backend.
pub const ALL_SCHEMAS: [TableSchema; 9] = [
    MOBILE_FRIENDLY_SCHEMA,
    TAGS_HISTORY_SCHEMA,
    TECH_HISTORY_SCHEMA,
    CRAWLER_TECH_SCHEMA,
    CRAWLER_SCHEMA,
    CLEARBIT_PERSON_SCHEMA,
    CLEARBIT_COMPANY_SCHEMA,
    WORDPRESS_PLUGIN_SCHEMA,
    EMAIL_PROVIDER_SCHEMA,
];
