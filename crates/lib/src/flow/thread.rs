//! Sender → assistant thread resolution.

use crate::clients::{AssistantClient, AssistantError, LeadRecord, LeadsClient};
use serde_json::{Map, Value};

/// Keys a lead record may carry its thread id under, in lookup order.
const THREAD_ID_KEYS: &[&str] = &["Thread_id", "thread_id", "thread", "ThreadID"];

/// Thread id stored on a lead record, if any.
pub fn thread_id_of(record: &Map<String, Value>) -> Option<&str> {
    THREAD_ID_KEYS
        .iter()
        .filter_map(|k| record.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

/// Thread for `number` under `tax_id`: reuse the one on the lead record, otherwise create a thread
/// and register it as a new active lead (backend and CRM, best-effort).
///
/// Only thread creation failures are returned.
pub async fn ensure_thread(
    assistant: &AssistantClient,
    leads: &LeadsClient,
    number: &str,
    tax_id: &str,
) -> Result<String, AssistantError> {
    match leads.find_lead(number, tax_id).await {
        Ok(Some(record)) => {
            if let Some(id) = thread_id_of(&record) {
                log::debug!("thread: reusing {} for {}", id, number);
                return Ok(id.to_string());
            }
        }
        Ok(None) => {}
        Err(e) => log::warn!("thread: lead lookup for {} failed: {}", number, e),
    }

    let thread_id = assistant.create_thread().await?;
    log::info!("thread: created {} for {}", thread_id, number);

    let lead = LeadRecord::new_active(number, tax_id, &thread_id);
    // Not fatal: the next message creates another thread if the record did not stick.
    if let Err(e) = leads.upsert_lead(&lead).await {
        log::warn!("thread: lead upsert for {} failed: {}", number, e);
    }
    if let Err(e) = leads.update_crm_lead(&lead).await {
        log::warn!("thread: crm update for {} failed: {}", number, e);
    }
    Ok(thread_id)
}
