use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use refinery_clearbit::{
    ClearbitClient, ErrorPayload, Lookup, make_company_payload, make_person_payload,
    make_tags_payload, make_tech_payload, resolve_api_key, tag_rows, tech_rows,
};
use refinery_shared::{Record, RefineryRequest, Result};
use refinery_storage::schema::{
    CLEARBIT_COMPANY_SCHEMA, CLEARBIT_PERSON_SCHEMA, TAGS_HISTORY_SCHEMA, TECH_HISTORY_SCHEMA,
};

use super::{ServiceKind, ServiceReport, file_name, insert};
use crate::context::ServiceContext;
use crate::progress::ProgressReporter;

/// Whatever the lookups turned up.
#[derive(Debug, Default)]
struct Enrichment {
    company: Option<Value>,
    person: Option<Value>,
}

/// Enrich the request with company and person data.
pub async fn clearbit(
    ctx: &ServiceContext,
    request: RefineryRequest,
    progress: &dyn ProgressReporter,
) -> Result<ServiceReport> {
    progress.phase("Resolving API key");
    let api_key =
        resolve_api_key(&ctx.config, &ctx.http, ctx.objects.as_ref(), &ctx.tokens).await?;
    let client = ClearbitClient::new(
        ctx.http.clone(),
        api_key,
        ctx.config.clearbit.clone(),
        ctx.retry_policy(),
    );
    clearbit_with_client(ctx, request, &client, progress).await
}

/// [`clearbit`] with an already-configured client.
#[instrument(skip_all, fields(refinery_id = ?request.row_id()))]
pub async fn clearbit_with_client(
    ctx: &ServiceContext,
    mut request: RefineryRequest,
    client: &ClearbitClient,
    progress: &dyn ProgressReporter,
) -> Result<ServiceReport> {
    let mut report = ServiceReport::new(ServiceKind::Clearbit);
    let id = file_name(&request)?;

    progress.phase("Looking up company and person");
    let enrichment = match look_up(client, &mut request).await? {
        Ok(enrichment) => enrichment,
        Err(error) => {
            info!(status = ?error.status_code, message = %error.error_message, "nothing found");
            upload_object(ctx, &mut report, "error", &id, &error.to_record()).await?;
            return Ok(report);
        }
    };

    if let Some(company) = &enrichment.company {
        request.extra.insert("company".into(), company.clone());
    }
    if let Some(person) = &enrichment.person {
        request.extra.insert("person".into(), person.clone());
    }

    progress.phase("Writing payloads");
    let tables = &ctx.config.tables;

    if let Some(company) = &enrichment.company {
        let payload = make_company_payload(&request, company);
        upload_object(ctx, &mut report, "company", &id, &payload).await?;
        insert(
            ctx,
            progress,
            &mut report,
            &tables.clearbit_company,
            &CLEARBIT_COMPANY_SCHEMA,
            &[payload],
        )
        .await?;

        let tags = make_tags_payload(&request, company);
        upload_object(ctx, &mut report, "tags", &id, &tags).await?;
        insert(
            ctx,
            progress,
            &mut report,
            &tables.tags_history,
            &TAGS_HISTORY_SCHEMA,
            &tag_rows(&tags),
        )
        .await?;

        let tech = make_tech_payload(&request, company);
        upload_object(ctx, &mut report, "tech", &id, &tech).await?;
        insert(
            ctx,
            progress,
            &mut report,
            &tables.tech_history,
            &TECH_HISTORY_SCHEMA,
            &tech_rows(&tech),
        )
        .await?;
    }

    if let Some(person) = &enrichment.person {
        let payload = make_person_payload(&request, person);
        upload_object(ctx, &mut report, "person", &id, &payload).await?;
        insert(
            ctx,
            progress,
            &mut report,
            &tables.clearbit_person,
            &CLEARBIT_PERSON_SCHEMA,
            &[payload],
        )
        .await?;
    }

    Ok(report)
}

/// Email first, then domain, then IP. The first hit wins.
async fn look_up(
    client: &ClearbitClient,
    request: &mut RefineryRequest,
) -> Result<std::result::Result<Enrichment, ErrorPayload>> {
    let mut missing = ErrorPayload::unknown("no email, domain or ip address to look up");

    if let Some(email) = request.email.clone() {
        match client.find_combined(&email).await? {
            Lookup::Found(body) => {
                let enrichment = Enrichment {
                    company: present(&body, "company"),
                    person: present(&body, "person"),
                };
                if enrichment.company.is_some() || enrichment.person.is_some() {
                    debug!("found by email");
                    return Ok(Ok(enrichment));
                }
            }
            Lookup::Missing(error) => missing = error,
        }
    }

    if let Some(domain) = request.domain.clone() {
        match client.find_company(&domain).await? {
            Lookup::Found(company) => {
                debug!("found by domain");
                return Ok(Ok(Enrichment {
                    company: Some(company),
                    person: None,
                }));
            }
            Lookup::Missing(error) => missing = error,
        }
    }

    if let Some(ip) = request.ip_address.clone() {
        match client.reveal(&ip).await? {
            Lookup::Found(body) => {
                if let Some(company) = present(&body, "company") {
                    debug!("found by ip");
                    request.ip_revealed = true;
                    if request.domain.is_none() {
                        request.domain = body["domain"].as_str().map(String::from);
                    }
                    return Ok(Ok(Enrichment {
                        company: Some(company),
                        person: None,
                    }));
                }
                warn!("reveal answered without a company");
            }
            Lookup::Missing(error) => missing = error,
        }
    }

    Ok(Err(missing))
}

fn present(body: &Value, key: &str) -> Option<Value> {
    body.get(key).filter(|v| v.is_object()).cloned()
}

/// Write `record` to `clearbit/<kind>/<id>.json`.
async fn upload_object(
    ctx: &ServiceContext,
    report: &mut ServiceReport,
    kind: &str,
    id: &str,
    record: &Record,
) -> Result<()> {
    let name = format!("clearbit/{kind}/{id}.json");
    ctx.objects
        .upload_json(&ctx.config.objects.bucket, &name, &Value::Object(record.clone()))
        .await?;
    report.objects_written.push(name);
    Ok(())
}
