//! REST client for the CRM's inbound-webhook API.
//!
//! Every method is a `POST {base}/rest/{user}/{token}/{method}.json` with a
//! JSON body. Successful answers wrap the payload as `{"result": ...}`;
//! failures carry `{"error": ..., "error_description": ...}`, usually with a
//! 4xx status.

use crate::actor::{CrmActor, CrmDirectory};
use crate::error::CrmError;
use crate::model::{CrmUser, Deal, Task};
use async_trait::async_trait;
use deal_courier_core::{CommentId, CrmUserId, DealId, Result, TaskId};
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument};

const DEAL_FIELDS: [&str; 5] = ["ID", "TITLE", "TYPE_ID", "CATEGORY_ID", "STAGE_ID"];
const TASK_FIELDS: [&str; 3] = ["ID", "TITLE", "STATUS"];

/// Successful response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
    /// Offset of the next page for list methods.
    #[serde(default)]
    next: Option<u64>,
}

/// Error response body.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// `tasks.task.list` nests its list one level deeper than the CRM methods.
#[derive(Debug, Deserialize)]
struct TaskListResult {
    #[serde(default)]
    tasks: Vec<Task>,
}

/// Interprets a raw response body.
fn parse_body<T: DeserializeOwned>(
    method: &str,
    status: u16,
    body: &str,
) -> std::result::Result<Envelope<T>, CrmError> {
    if let Ok(api_error) = serde_json::from_str::<ApiErrorBody>(body) {
        return Err(CrmError::Api {
            method: method.to_string(),
            code: api_error.error,
            description: api_error.error_description,
        });
    }
    if !(200..300).contains(&status) {
        return Err(CrmError::Status {
            method: method.to_string(),
            status,
        });
    }
    serde_json::from_str(body).map_err(|e| CrmError::InvalidResponse {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

/// Low-level webhook client shared by every actor.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RestClient {
    /// Creates a client for the webhook owned by `webhook_user`.
    #[must_use]
    pub fn new(base_url: &str, webhook_user: CrmUserId, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/rest/{webhook_user}/{token}", base_url.trim_end_matches('/')),
        }
    }

    /// Returns the URL a method is posted to.
    #[must_use]
    pub fn method_url(&self, method: &str) -> String {
        format!("{}/{method}.json", self.endpoint)
    }

    /// Calls a method and returns the whole envelope.
    #[instrument(skip(self, params))]
    async fn call<P, T>(&self, method: &str, params: &P) -> Result<Envelope<T>, CrmError>
    where
        P: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .json(params)
            .send()
            .await
            .map_err(|e| CrmError::RequestFailed {
                method: method.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| CrmError::RequestFailed {
            method: method.to_string(),
            reason: e.to_string(),
        })?;
        debug!(status, bytes = body.len(), "crm response");

        let envelope = parse_body(method, status, &body)?;
        Ok(envelope)
    }
}

/// A CRM actor backed by the webhook client.
pub struct RestActor {
    client: RestClient,
    user: CrmUser,
}

impl RestActor {
    /// Creates an actor for an already resolved user.
    #[must_use]
    pub fn new(client: RestClient, user: CrmUser) -> Self {
        Self { client, user }
    }
}

#[async_trait]
impl CrmActor for RestActor {
    fn profile(&self) -> &CrmUser {
        &self.user
    }

    async fn list_deals(&self) -> Result<Vec<Deal>, CrmError> {
        let mut deals = Vec::new();
        let mut start = 0;
        loop {
            let params = json!({
                "SELECT": DEAL_FIELDS,
                "ORDER": { "DATE_MODIFY": "DESC" },
                "FILTER": { "ASSIGNED_BY_ID": self.user.id, "CLOSED": "N" },
                "START": start,
            });
            let page: Envelope<Vec<Deal>> = self.client.call("crm.deal.list", &params).await?;
            deals.extend(page.result);
            match page.next {
                Some(next) if next > start => start = next,
                _ => break,
            }
        }
        Ok(deals)
    }

    async fn add_comment_to_deal(
        &self,
        deal: DealId,
        comment: &str,
    ) -> Result<CommentId, CrmError> {
        let params = json!({
            "fields": {
                "ENTITY_ID": deal,
                "ENTITY_TYPE": "deal",
                "COMMENT": comment,
                "AUTHOR_ID": self.user.id,
            }
        });
        let created: Envelope<CommentId> = self
            .client
            .call("crm.timeline.comment.add", &params)
            .await?;
        Ok(created.result)
    }

    async fn list_deal_tasks(&self, deal: DealId) -> Result<Vec<Task>, CrmError> {
        let params = json!({
            "select": TASK_FIELDS,
            "order": { "ID": "asc" },
            "filter": {
                "UF_CRM_TASK": format!("D_{deal}"),
                "RESPONSIBLE_ID": self.user.id,
            },
        });
        let listed: Envelope<TaskListResult> =
            self.client.call("tasks.task.list", &params).await?;
        Ok(listed
            .result
            .tasks
            .into_iter()
            .filter(|task| !task.status.is_closed())
            .collect())
    }

    async fn complete_task(&self, task: TaskId) -> Result<(), CrmError> {
        let params = json!({ "taskId": task });
        let _: Envelope<serde_json::Value> =
            self.client.call("tasks.task.complete", &params).await?;
        Ok(())
    }
}

/// Resolves users through `user.get`.
pub struct RestDirectory {
    client: RestClient,
}

impl RestDirectory {
    #[must_use]
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    async fn find_one(&self, field: &str, value: String) -> Result<Arc<dyn CrmActor>, CrmError> {
        let lookup = format!("{field} {value}");
        let params = json!({ "FILTER": { field: value } });
        let found: Envelope<Vec<CrmUser>> = self.client.call("user.get", &params).await?;

        let mut users = found.result;
        match users.len() {
            0 => Err(CrmError::UserNotFound { lookup }.into()),
            1 => {
                let user = users.remove(0);
                debug!(crm_user = %user.id, "resolved crm user");
                Ok(Arc::new(RestActor::new(self.client.clone(), user)))
            }
            count => Err(CrmError::SeveralUsersFound { lookup, count }.into()),
        }
    }
}

#[async_trait]
impl CrmDirectory for RestDirectory {
    async fn authenticate_by_phone(&self, phone: &str) -> Result<Arc<dyn CrmActor>, CrmError> {
        self.find_one("PERSONAL_MOBILE", phone.to_string()).await
    }

    async fn authenticate_by_id(&self, id: CrmUserId) -> Result<Arc<dyn CrmActor>, CrmError> {
        self.find_one("ID", id.to_string()).await
    }
}
