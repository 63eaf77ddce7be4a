//! REST client for the dashboard's PostgREST endpoint.
//!
//! Every request carries the service key both as `apikey` and as a bearer
//! token. Filters use PostgREST's `column=op.value` syntax.

pub mod dashboard;

pub use dashboard::{ExplainFeature, PositionTarget};

use async_trait::async_trait;
use insight_core::{
    DataSource, HistoryPoint, IndicatorFeature, InsightError, InsightResult, RegimeSnapshot,
    ValuedPosition,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

const REST_PREFIX: &str = "/rest/v1";

#[derive(Clone)]
pub struct PostgrestClient {
    base_url: String,
    service_key: String,
    client: Client,
}

impl PostgrestClient {
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            client,
        }
    }

    fn url(&self, relation: &str) -> String {
        format!("{}{}/{}", self.base_url, REST_PREFIX, relation)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Accept", "application/json")
    }

    /// GET a relation with the given query pairs and decode the row array.
    pub(crate) async fn select<T: DeserializeOwned>(
        &self,
        relation: &str,
        query: &[(&str, String)],
    ) -> InsightResult<Vec<T>> {
        let response = self
            .authorized(self.client.get(self.url(relation)).query(query))
            .send()
            .await
            .map_err(|e| InsightError::DataSource(format!("{relation}: {e}")))?;

        if !response.status().is_success() {
            return Err(InsightError::DataSource(format!(
                "{}: HTTP {}: {}",
                relation,
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| InsightError::DataSource(format!("{relation}: invalid body: {e}")))
    }

    /// PATCH every row matching `filters`.
    pub(crate) async fn patch(
        &self,
        relation: &str,
        filters: &[(&str, String)],
        body: &serde_json::Value,
    ) -> InsightResult<()> {
        let response = self
            .authorized(self.client.patch(self.url(relation)).query(filters))
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await
            .map_err(|e| InsightError::DataSource(format!("{relation}: {e}")))?;

        if !response.status().is_success() {
            return Err(InsightError::DataSource(format!(
                "{}: HTTP {}: {}",
                relation,
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Most recent observations of an indicator, oldest first.
    pub async fn get_history(&self, code: &str, limit: usize) -> InsightResult<Vec<HistoryPoint>> {
        let mut rows: Vec<HistoryPoint> = self
            .select(
                "indicator_values",
                &[
                    ("select", "obs_date,raw_value".to_string()),
                    ("code", format!("eq.{code}")),
                    ("obs_date", "not.is.null".to_string()),
                    ("order", "obs_date.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        rows.reverse();
        Ok(rows)
    }

    /// Every indicator feature row, grouped by category
    pub async fn get_all_features(&self) -> InsightResult<Vec<IndicatorFeature>> {
        self.select(
            "v_indicator_features",
            &[("order", "category.asc,code.asc".to_string())],
        )
        .await
    }
}

fn in_list(codes: &[String]) -> String {
    let quoted: Vec<String> = codes.iter().map(|c| format!("\"{c}\"")).collect();
    format!("in.({})", quoted.join(","))
}

#[async_trait]
impl DataSource for PostgrestClient {
    async fn indicator_feature(&self, code: &str) -> InsightResult<Option<IndicatorFeature>> {
        let rows: Vec<IndicatorFeature> = self
            .select(
                "v_indicator_features",
                &[("code", format!("eq.{code}")), ("limit", "1".to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn indicator_history(
        &self,
        code: &str,
        limit: usize,
    ) -> InsightResult<Vec<HistoryPoint>> {
        self.get_history(code, limit).await
    }

    async fn indicator_features(&self, codes: &[String]) -> InsightResult<Vec<IndicatorFeature>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        self.select("v_indicator_features", &[("code", in_list(codes))])
            .await
    }

    async fn latest_regime(&self) -> InsightResult<Option<RegimeSnapshot>> {
        let rows: Vec<RegimeSnapshot> = self
            .select(
                "v_regime_snapshot",
                &[
                    ("order", "asof_date.desc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn valued_positions(&self) -> InsightResult<Vec<ValuedPosition>> {
        self.select(
            "v_portfolio_positions_valued_sgd",
            &[("select", "*".to_string())],
        )
        .await
    }
}
