use std::sync::Arc;

use serde_json::{json, Value};

use crate::{
    application::{AppError, AppResult, ProjectAttributor, RpcClient},
    domain::ProjectContribution,
};

pub const DEFAULT_TRANSACTION_METHOD: &str = "getConfirmedTransaction";

pub struct TransactionResolver {
    client: RpcClient,
    attributor: Arc<dyn ProjectAttributor>,
    method: String,
}

impl TransactionResolver {
    pub fn new(client: RpcClient, attributor: Arc<dyn ProjectAttributor>) -> Self {
        Self {
            client,
            attributor,
            method: DEFAULT_TRANSACTION_METHOD.to_string(),
        }
    }

    /// Switches to another get-transaction method, e.g. `getTransaction`.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn attributor_name(&self) -> &str {
        self.attributor.name()
    }

    /// Fetches the `jsonParsed` transaction. A `null` result (pruned or not yet
    /// finalized) is `NotFound`.
    pub async fn fetch_transaction(&self, signature: &str) -> AppResult<Value> {
        let mut config = json!({ "encoding": "jsonParsed" });
        // The legacy method predates versioned transactions.
        if self.method == "getTransaction" {
            config["maxSupportedTransactionVersion"] = json!(0);
        }

        let result = self
            .client
            .call(&self.method, vec![json!(signature), config])
            .await?;

        match result {
            Value::Null => Err(AppError::NotFound(signature.to_string())),
            Value::Object(_) => Ok(result),
            _ => Err(AppError::Protocol(format!(
                "transaction {signature} is not a JSON object"
            ))),
        }
    }

    /// `Ok(None)` means the transaction exists but nothing in it was attributable.
    pub async fn resolve(&self, signature: &str) -> AppResult<Option<ProjectContribution>> {
        let transaction = self.fetch_transaction(signature).await?;
        let contribution = self.attributor.attribute(&transaction);
        tracing::debug!(
            signature,
            attributor = self.attributor.name(),
            project_id = contribution.as_ref().map(|c| c.project_id.as_str()),
            "Resolved transaction"
        );
        Ok(contribution)
    }
}
