//! Flattening enrichment-API responses into analytics rows.

use serde_json::Value;

use refinery_shared::{FieldSpec, Record, RefineryRequest, copy_request_fields, flatten, identity_record};

/// Request fields carried on every enrichment payload.
const REQUEST_FIELDS: [&str; 7] = [
    "refinery_company_id",
    "refinery_person_id",
    "sfdc_lead_id",
    "sfdc_contact_id",
    "sfdc_asset_id",
    "ip_revealed",
    "fuzzy_match",
];

const COMPANY_FIELDS: &[FieldSpec] = &[
    FieldSpec::copy("clearbit_company_id", "/id"),
    FieldSpec::copy("company_name", "/name"),
    FieldSpec::copy("legal_name", "/legalName"),
    FieldSpec::copy("company_domain", "/domain"),
    FieldSpec::join("domain_aliases", "/domainAliases"),
    FieldSpec::join("phone_numbers", "/site/phoneNumbers"),
    FieldSpec::join("email_addresses", "/site/emailAddresses"),
    FieldSpec::copy("industry", "/category/industry"),
    FieldSpec::copy("industry_group", "/category/industryGroup"),
    FieldSpec::copy("naics_code", "/category/naicsCode"),
    FieldSpec::copy("sector", "/category/sector"),
    FieldSpec::copy("sic_code", "/category/sicCode"),
    FieldSpec::copy("sub_industry", "/category/subIndustry"),
    FieldSpec::strip_cr("description", "/description"),
    FieldSpec::copy("year_founded", "/foundedYear"),
    FieldSpec::copy("location", "/location"),
    FieldSpec::copy("time_zone", "/timeZone"),
    FieldSpec::copy("utc_offset", "/utcOffset"),
    FieldSpec::copy("street_number", "/geo/streetNumber"),
    FieldSpec::copy("street_name", "/geo/streetName"),
    FieldSpec::copy("sub_premise", "/geo/subPremise"),
    FieldSpec::copy("city", "/geo/city"),
    FieldSpec::copy("postal_code", "/geo/postalCode"),
    FieldSpec::copy("state", "/geo/state"),
    FieldSpec::copy("state_code", "/geo/stateCode"),
    FieldSpec::copy("country", "/geo/country"),
    FieldSpec::copy("country_code", "/geo/countryCode"),
    FieldSpec::copy("latitude", "/geo/lat"),
    FieldSpec::copy("longitude", "/geo/lng"),
    FieldSpec::copy("company_logo", "/logo"),
    FieldSpec::copy("facebook_handle", "/facebook/handle"),
    FieldSpec::copy("facebook_likes", "/facebook/likes"),
    FieldSpec::copy("linkedin_handle", "/linkedin/handle"),
    FieldSpec::copy("twitter_handle", "/twitter/handle"),
    FieldSpec::copy("twitter_id", "/twitter/id"),
    FieldSpec::strip_cr("twitter_bio", "/twitter/bio"),
    FieldSpec::copy("twitter_follower_count", "/twitter/followers"),
    FieldSpec::copy("twitter_following_count", "/twitter/following"),
    FieldSpec::copy("twitter_location", "/twitter/location"),
    FieldSpec::copy("twitter_site_url", "/twitter/site"),
    FieldSpec::copy("twitter_avatar", "/twitter/avatar"),
    FieldSpec::copy("crunchbase_handle", "/crunchbase/handle"),
    FieldSpec::copy("is_email_provider", "/emailProvider"),
    FieldSpec::copy("company_type", "/type"),
    FieldSpec::copy("ticker_symbol", "/ticker"),
    FieldSpec::copy("tax_ein", "/identifiers/usEIN"),
    FieldSpec::copy("company_phone", "/phone"),
    FieldSpec::copy("clearbit_indexed_at", "/indexedAt"),
    FieldSpec::copy("alexa_us_rank", "/metrics/alexaUsRank"),
    FieldSpec::copy("alexa_global_rank", "/metrics/alexaGlobalRank"),
    FieldSpec::copy("number_of_employees", "/metrics/employees"),
    FieldSpec::copy("number_of_employees_range", "/metrics/employeesRange"),
    FieldSpec::copy("market_cap", "/metrics/marketCap"),
    FieldSpec::copy("total_raised", "/metrics/raised"),
    FieldSpec::copy("annual_revenue", "/metrics/annualRevenue"),
    FieldSpec::copy("estimated_annual_revenue", "/metrics/estimatedAnnualRevenue"),
    FieldSpec::copy("fiscal_year_ends", "/metrics/fiscalYearEnd"),
    FieldSpec::copy("parent_domain", "/parent/domain"),
];

const PERSON_FIELDS: &[FieldSpec] = &[
    FieldSpec::copy("clearbit_person_id", "/id"),
    FieldSpec::copy("clearbit_indexed_at", "/indexedAt"),
    FieldSpec::copy("full_name", "/name/fullName"),
    FieldSpec::copy("first_name", "/name/givenName"),
    FieldSpec::copy("last_name", "/name/familyName"),
    FieldSpec::copy("email", "/email"),
    FieldSpec::copy("location", "/location"),
    FieldSpec::copy("time_zone", "/timeZone"),
    FieldSpec::copy("utc_offset", "/utcOffset"),
    FieldSpec::copy("city", "/geo/city"),
    FieldSpec::copy("state", "/geo/state"),
    FieldSpec::copy("state_code", "/geo/stateCode"),
    FieldSpec::copy("country", "/geo/country"),
    FieldSpec::copy("country_code", "/geo/countryCode"),
    FieldSpec::copy("latitude", "/geo/lat"),
    FieldSpec::copy("longitude", "/geo/lng"),
    FieldSpec::strip_cr("bio", "/bio"),
    FieldSpec::copy("site", "/site"),
    FieldSpec::copy("avatar", "/avatar"),
    FieldSpec::copy("employment_domain", "/employment/domain"),
    FieldSpec::copy("employment_name", "/employment/name"),
    FieldSpec::copy("employment_title", "/employment/title"),
    FieldSpec::copy("employment_role", "/employment/role"),
    FieldSpec::copy("employment_seniority", "/employment/seniority"),
    FieldSpec::copy("facebook_handle", "/facebook/handle"),
    FieldSpec::copy("github_handle", "/github/handle"),
    FieldSpec::copy("github_avatar", "/github/avatar"),
    FieldSpec::copy("github_company", "/github/company"),
    FieldSpec::copy("github_blog", "/github/blog"),
    FieldSpec::copy("github_followers", "/github/followers"),
    FieldSpec::copy("github_following", "/github/following"),
    FieldSpec::copy("twitter_handle", "/twitter/handle"),
    FieldSpec::copy("twitter_id", "/twitter/id"),
    FieldSpec::strip_cr("twitter_bio", "/twitter/bio"),
    FieldSpec::copy("twitter_followers", "/twitter/followers"),
    FieldSpec::copy("twitter_following", "/twitter/following"),
    FieldSpec::copy("twitter_location", "/twitter/location"),
    FieldSpec::copy("twitter_site", "/twitter/site"),
    FieldSpec::copy("twitter_avatar", "/twitter/avatar"),
    FieldSpec::copy("linkedin_handle", "/linkedin/handle"),
    FieldSpec::copy("googleplus_handle", "/googleplus/handle"),
    FieldSpec::copy("gravatar_handle", "/gravatar/handle"),
    FieldSpec::pluck("gravatar_url_titles", "/gravatar/urls", "title"),
    FieldSpec::pluck("gravatar_urls", "/gravatar/urls", "value"),
    FieldSpec::copy("gravatar_avatar", "/gravatar/avatar"),
    FieldSpec::pluck("gravatar_avatar_types", "/gravatar/avatars", "type"),
    FieldSpec::pluck("gravatar_avatar_urls", "/gravatar/avatars", "url"),
    FieldSpec::copy("fuzzy_match", "/fuzzy"),
    FieldSpec::copy("is_email_provider", "/emailProvider"),
];

fn base_payload(request: &RefineryRequest) -> Record {
    let mut payload = identity_record(request);
    copy_request_fields(&mut payload, request, &REQUEST_FIELDS);
    payload
}

/// Company columns for `company` plus the request's identity.
pub fn make_company_payload(request: &RefineryRequest, company: &Value) -> Record {
    let mut payload = base_payload(request);
    payload.extend(flatten(company, COMPANY_FIELDS));
    payload
}

/// Person columns for `person` plus the request's identity.
pub fn make_person_payload(request: &RefineryRequest, person: &Value) -> Record {
    let mut payload = base_payload(request);
    payload.extend(flatten(person, PERSON_FIELDS));
    payload
}

fn list_payload(request: &RefineryRequest, company: &Value, key: &str) -> Record {
    let mut payload = base_payload(request);
    let items = company
        .get(key)
        .filter(|v| v.is_array())
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    payload.insert(key.to_string(), items);
    payload
}

/// The company's `tags` list with the request's identity.
pub fn make_tags_payload(request: &RefineryRequest, company: &Value) -> Record {
    list_payload(request, company, "tags")
}

/// The company's `tech` list with the request's identity.
pub fn make_tech_payload(request: &RefineryRequest, company: &Value) -> Record {
    list_payload(request, company, "tech")
}

fn expand(payload: &Record, list_key: &str, column: &str) -> Vec<Record> {
    let Some(items) = payload.get(list_key).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .map(|item| {
            let mut row = payload.clone();
            row.remove(list_key);
            row.insert(column.to_string(), Value::String(item.to_string()));
            row
        })
        .collect()
}

/// One `tag` row per entry of a tags payload.
pub fn tag_rows(payload: &Record) -> Vec<Record> {
    expand(payload, "tags", "tag")
}

/// One `tech` row per entry of a tech payload.
pub fn tech_rows(payload: &Record) -> Vec<Record> {
    expand(payload, "tech", "tech")
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinery_storage::schema::{
        CLEARBIT_COMPANY_SCHEMA, CLEARBIT_PERSON_SCHEMA, TAGS_HISTORY_SCHEMA, TECH_HISTORY_SCHEMA,
    };
    use serde_json::json;

    fn request() -> RefineryRequest {
        RefineryRequest {
            refinery_id: Some("r1".into()),
            refinery_company_id: Some("c-1".into()),
            refined_at: Some("2018-11-02T13:45:00Z".into()),
            refined_date: Some("2018-11-02".into()),
            domain: Some("example.com".into()),
            url: Some("http://www.example.com".into()),
            sfdc_lead_id: Some("00Q1".into()),
            ..RefineryRequest::default()
        }
    }

    fn company() -> Value {
        json!({
            "id": "3f5d6a4e",
            "name": "Example",
            "legalName": "Example Inc.",
            "domain": "example.com",
            "domainAliases": ["example.org", "example.net"],
            "site": {"phoneNumbers": ["+1 555 234 5678"], "emailAddresses": []},
            "category": {"sector": "Information Technology", "naicsCode": "51"},
            "tags": ["B2B", "SAAS"],
            "tech": ["google_analytics", "wordpress"],
            "description": "Tools for\r\nsmall business",
            "foundedYear": 2004,
            "geo": {"city": "Chandler", "lat": 33.3, "lng": -111.8},
            "twitter": {"id": "12345", "followers": 900, "bio": null},
            "metrics": {"employees": 700, "estimatedAnnualRevenue": "$50M-$100M"},
            "emailProvider": false,
            "indexedAt": "2018-10-22T03:12:51.000Z",
            "parent": {"domain": null}
        })
    }

    fn person() -> Value {
        json!({
            "id": "p-9",
            "name": {"fullName": "Alex Doe", "givenName": "Alex", "familyName": "Doe"},
            "email": "alex@example.com",
            "bio": "Builder\rof things",
            "github": {"followers": 12},
            "twitter": {"id": 4242},
            "gravatar": {
                "handle": "alexd",
                "urls": [
                    {"title": "Blog", "value": "https://blog.example.com"},
                    {"title": "Site", "value": "https://alex.example.com"}
                ],
                "avatars": [{"type": "thumbnail", "url": "https://g.example/a.png"}]
            },
            "fuzzy": true,
            "emailProvider": false
        })
    }

    #[test]
    fn company_payload_maps_and_joins() {
        let payload = make_company_payload(&request(), &company());
        assert_eq!(payload["refinery_id"], "r1");
        assert_eq!(payload["refinery_company_id"], "c-1");
        assert_eq!(payload["clearbit_company_id"], "3f5d6a4e");
        assert_eq!(payload["domain_aliases"], "example.org >>> example.net");
        assert_eq!(payload["email_addresses"], "");
        assert_eq!(payload["description"], "Tools for \nsmall business");
        assert_eq!(payload["latitude"], 33.3);
        assert_eq!(payload["industry"], Value::Null);
        assert_eq!(payload["parent_domain"], Value::Null);
        assert_eq!(payload["twitter_bio"], Value::Null);

        let row = CLEARBIT_COMPANY_SCHEMA.select(&payload);
        assert_eq!(CLEARBIT_COMPANY_SCHEMA.validate(&row), Ok(()));
    }

    #[test]
    fn every_company_column_is_mapped() {
        let payload = make_company_payload(&request(), &company());
        for column in CLEARBIT_COMPANY_SCHEMA.columns() {
            assert!(payload.contains_key(column), "missing {column}");
        }
    }

    #[test]
    fn person_payload_plucks_gravatar() {
        let payload = make_person_payload(&request(), &person());
        assert_eq!(payload["full_name"], "Alex Doe");
        assert_eq!(payload["bio"], "Builder of things");
        assert_eq!(payload["gravatar_url_titles"], "Blog >>> Site");
        assert_eq!(
            payload["gravatar_urls"],
            "https://blog.example.com >>> https://alex.example.com"
        );
        assert_eq!(payload["gravatar_avatar_types"], "thumbnail");
        assert_eq!(payload["fuzzy_match"], true);

        for column in CLEARBIT_PERSON_SCHEMA.columns() {
            assert!(payload.contains_key(column), "missing {column}");
        }
        let row = CLEARBIT_PERSON_SCHEMA.select(&payload);
        assert_eq!(CLEARBIT_PERSON_SCHEMA.validate(&row), Ok(()));
    }

    #[test]
    fn tags_and_tech_expand_to_rows() {
        let tags = make_tags_payload(&request(), &company());
        assert_eq!(tags["tags"], json!(["B2B", "SAAS"]));

        let rows = tag_rows(&tags);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["tag"], "SAAS");
        assert!(!rows[0].contains_key("tags"));
        assert!(rows.iter().all(|r| TAGS_HISTORY_SCHEMA.validate(&TAGS_HISTORY_SCHEMA.select(r)).is_ok()));

        let tech = tech_rows(&make_tech_payload(&request(), &company()));
        assert_eq!(tech[0]["tech"], "google_analytics");
        assert!(tech.iter().all(|r| TECH_HISTORY_SCHEMA.validate(&TECH_HISTORY_SCHEMA.select(r)).is_ok()));
    }

    #[test]
    fn missing_lists_give_no_rows() {
        let payload = make_tags_payload(&request(), &json!({"name": "No tags"}));
        assert_eq!(payload["tags"], json!([]));
        assert!(tag_rows(&payload).is_empty());
    }
}
