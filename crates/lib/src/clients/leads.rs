//! Leads/products backend (`:8889`) and CRM (`:8082`) client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lead record as exchanged with `/leads_geral`, `/leadpost` and the CRM `/leads` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "numero")]
    pub number: String,
    pub status: i32,
    pub lead: i32,
    #[serde(rename = "Thread_id")]
    pub thread_id: String,
    /// Local time, `YYYY-MM-DD HH:MM`.
    #[serde(rename = "data_ult_msg")]
    pub last_message_at: String,
    #[serde(rename = "ult_msg_numero")]
    pub last_message_number: String,
    #[serde(rename = "cnpj_cpf")]
    pub tax_id: String,
}

impl LeadRecord {
    /// Query payload for `/leads_geral`: only number and tax id are meaningful.
    pub fn lookup(number: &str, tax_id: &str) -> Self {
        Self {
            number: number.to_string(),
            tax_id: tax_id.to_string(),
            ..Self::default()
        }
    }

    /// New active lead bound to a freshly created thread (id 0 asks the backend to insert).
    pub fn new_active(number: &str, tax_id: &str, thread_id: &str) -> Self {
        Self {
            id: 0,
            name: String::new(),
            number: number.to_string(),
            status: 1,
            lead: 1,
            thread_id: thread_id.to_string(),
            last_message_at: chrono::Local::now().format("%Y-%m-%d %H:%M").to_string(),
            last_message_number: String::new(),
            tax_id: tax_id.to_string(),
        }
    }
}

/// Product as returned by `/produtos`. Fields of an unexpected JSON type read as empty;
/// price may be a number or a string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Product {
    pub name: String,
    pub description: String,
    pub price: Value,
}

impl Product {
    /// Read `nome`, `descricao` and `preco` from one catalog entry. None for non-objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Some(Self {
            name: text("nome"),
            description: text("descricao"),
            price: map.get("preco").cloned().unwrap_or(Value::Null),
        })
    }

    /// Price as shown to the customer: strings verbatim, numbers in their JSON form.
    pub fn price_label(&self) -> String {
        match &self.price {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LeadsError {
    #[error("leads request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("leads api error: {0}")]
    Api(String),
}

/// Client for the leads/products backend and the optional CRM.
#[derive(Clone)]
pub struct LeadsClient {
    base_url: String,
    /// Empty disables CRM calls.
    crm_base_url: String,
    client: reqwest::Client,
}

impl LeadsClient {
    pub fn new(base_url: &str, crm_base_url: &str) -> Self {
        Self::with_client(base_url, crm_base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, crm_base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            crm_base_url: crm_base_url.trim().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<reqwest::Response, LeadsError> {
        let res = self.client.post(url).json(body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LeadsError::Api(format!("{} {}", status, body)));
        }
        Ok(res)
    }

    /// POST /leads_geral: look up the lead for `number` under `tax_id`.
    /// Returns the raw record map; `None` when the backend answers with a non-object (e.g. null).
    pub async fn find_lead(
        &self,
        number: &str,
        tax_id: &str,
    ) -> Result<Option<Map<String, Value>>, LeadsError> {
        let url = format!("{}/leads_geral", self.base_url);
        let res = self.post_json(&url, &LeadRecord::lookup(number, tax_id)).await?;
        let data: Value = res.json().await?;
        Ok(match data {
            Value::Object(map) => Some(map),
            _ => None,
        })
    }

    /// POST /leadpost: insert or update a lead.
    pub async fn upsert_lead(&self, lead: &LeadRecord) -> Result<Value, LeadsError> {
        let url = format!("{}/leadpost", self.base_url);
        let res = self.post_json(&url, lead).await?;
        let bytes = res.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| LeadsError::Api(e.to_string()))
    }

    /// GET /produtos?cnpj=..[&id=..]: list products of a tenant, optionally a single id.
    pub async fn products(
        &self,
        tax_id: &str,
        id: Option<&str>,
    ) -> Result<Vec<Product>, LeadsError> {
        let url = format!("{}/produtos", self.base_url);
        let mut query = vec![("cnpj", tax_id)];
        if let Some(id) = id.filter(|s| !s.is_empty()) {
            query.push(("id", id));
        }
        let res = self.client.get(&url).query(&query).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LeadsError::Api(format!("{} {}", status, body)));
        }
        let data: Vec<Value> = res.json().await?;
        Ok(data.iter().filter_map(Product::from_value).collect())
    }

    /// True when a CRM base URL is configured.
    pub fn crm_enabled(&self) -> bool {
        !self.crm_base_url.is_empty()
    }

    /// POST {crm}/leads: mirror a lead payload into the CRM. No-op without a CRM URL.
    pub async fn update_crm_lead<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), LeadsError> {
        if !self.crm_enabled() {
            return Ok(());
        }
        let url = format!("{}/leads", self.crm_base_url);
        self.post_json(&url, payload).await?;
        Ok(())
    }
}
