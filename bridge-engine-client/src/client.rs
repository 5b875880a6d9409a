//! Engine client: fetch-and-lock, complete/failure/bpmnError/unlock,
//! process-definition XML, task listing, and process-definition/instance
//! management for the operator CLI (§6).

use crate::error::EngineClientError;
use bridge_shared::codec::VariableMap;
use bridge_shared::resilience::{CircuitBreaker, CircuitBreakerBehavior, CircuitBreakerConfig};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct TopicSubscription {
    pub topic_name: String,
    pub lock_duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchAndLockRequest {
    pub worker_id: String,
    pub max_tasks: u32,
    pub async_response_timeout: Option<u64>,
    pub topics: Vec<TopicSubscription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalTask {
    pub id: String,
    pub topic_name: String,
    pub process_instance_id: String,
    pub process_definition_id: String,
    pub process_definition_key: Option<String>,
    pub activity_id: String,
    pub activity_instance_id: Option<String>,
    pub business_key: Option<String>,
    pub tenant_id: Option<String>,
    pub retries: Option<i32>,
    pub priority: Option<i64>,
    pub lock_expiration_time: Option<String>,
    #[serde(default)]
    pub variables: VariableMap,
}

#[derive(Debug, Serialize)]
struct CompleteRequest<'a> {
    worker_id: &'a str,
    #[serde(skip_serializing_if = "VariableMap::is_empty")]
    variables: VariableMap,
    #[serde(rename = "localVariables", skip_serializing_if = "VariableMap::is_empty")]
    local_variables: VariableMap,
}

#[derive(Debug, Serialize)]
struct FailureRequest<'a> {
    worker_id: &'a str,
    error_message: &'a str,
    error_details: Option<&'a str>,
    retries: i32,
    retry_timeout: i64,
}

#[derive(Debug, Serialize)]
struct BpmnErrorRequest<'a> {
    worker_id: &'a str,
    error_code: &'a str,
    error_message: &'a str,
    #[serde(skip_serializing_if = "VariableMap::is_empty")]
    variables: VariableMap,
}

#[derive(Debug, Serialize)]
struct UnlockRequest<'a> {
    worker_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ProcessDefinitionXml {
    pub id: String,
    pub bpmn20_xml: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessDefinition {
    pub id: String,
    pub key: String,
    pub name: Option<String>,
    pub version: i32,
    #[serde(default)]
    pub suspended: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessInstance {
    pub id: String,
    pub definition_id: String,
    pub business_key: Option<String>,
    #[serde(default)]
    pub ended: bool,
    #[serde(default)]
    pub suspended: bool,
}

#[derive(Debug, Serialize)]
struct StartProcessInstanceRequest {
    #[serde(skip_serializing_if = "VariableMap::is_empty")]
    variables: VariableMap,
}

#[derive(Debug, Serialize)]
struct SuspendRequest {
    suspended: bool,
}

#[derive(Debug, Serialize)]
struct DeleteProcessInstanceQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    delete_reason: Option<&'a str>,
}

/// A thin REST client over the engine's external-task API. Retry/backoff
/// across calls lives in the Poller and the Response Loop; this client
/// guards each external-task call with its own circuit breaker so an
/// engine outage fails fast instead of retrying into a dead host.
#[derive(Debug, Clone)]
pub struct EngineClient {
    http: Client,
    base_url: String,
    worker_id: String,
    basic_auth: Option<(String, String)>,
    breaker: Arc<CircuitBreaker>,
}

impl EngineClient {
    pub fn new(
        base_url: impl Into<String>,
        worker_id: impl Into<String>,
        basic_auth: Option<(String, String)>,
        timeout: Duration,
    ) -> Result<Self, EngineClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineClientError::request("client-build", e))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            worker_id: worker_id.into(),
            basic_auth,
            breaker: Arc::new(CircuitBreaker::new("engine", CircuitBreakerConfig::default())),
        })
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    /// Gates a call behind the engine circuit breaker and records the
    /// outcome, mirroring `BrokerAdapter::publish`'s guard shape.
    async fn guarded<T>(
        &self,
        path: &str,
        fut: impl Future<Output = Result<T, EngineClientError>>,
    ) -> Result<T, EngineClientError> {
        if !self.breaker.should_allow() {
            return Err(EngineClientError::circuit_open(path));
        }
        let started = Instant::now();
        let result = fut.await;
        match &result {
            Ok(_) => self.breaker.record_success(started.elapsed()),
            Err(_) => self.breaker.record_failure(started.elapsed()),
        }
        result
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.basic_auth {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    async fn check_status(
        path: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, EngineClientError> {
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(EngineClientError::unauthorized(path))
            }
            StatusCode::NOT_FOUND => Err(EngineClientError::task_not_found(path)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(EngineClientError::unexpected_status(path, status.as_u16(), body))
            }
        }
    }

    pub async fn fetch_and_lock(
        &self,
        request: &FetchAndLockRequest,
    ) -> Result<Vec<ExternalTask>, EngineClientError> {
        let path = "/external-task/fetchAndLock";
        self.guarded(path, async {
            let response = self
                .authed(self.http.post(self.url(path)))
                .json(request)
                .send()
                .await
                .map_err(|e| EngineClientError::request(path, e))?;
            let response = Self::check_status(path, response).await?;
            response
                .json::<Vec<ExternalTask>>()
                .await
                .map_err(|e| EngineClientError::decode(path, json_err(e)))
        })
        .await
    }

    pub async fn complete(
        &self,
        task_id: &str,
        variables: VariableMap,
        local_variables: VariableMap,
    ) -> Result<(), EngineClientError> {
        let path = format!("/external-task/{task_id}/complete");
        self.guarded(&path, async {
            let response = self
                .authed(self.http.post(self.url(&path)))
                .json(&CompleteRequest {
                    worker_id: &self.worker_id,
                    variables,
                    local_variables,
                })
                .send()
                .await
                .map_err(|e| EngineClientError::request(&path, e))?;
            Self::check_status(&path, response).await.map(|_| ())
        })
        .await
    }

    pub async fn failure(
        &self,
        task_id: &str,
        error_message: &str,
        error_details: Option<&str>,
        retries: i32,
        retry_timeout: i64,
    ) -> Result<(), EngineClientError> {
        let path = format!("/external-task/{task_id}/failure");
        self.guarded(&path, async {
            let response = self
                .authed(self.http.post(self.url(&path)))
                .json(&FailureRequest {
                    worker_id: &self.worker_id,
                    error_message,
                    error_details,
                    retries,
                    retry_timeout,
                })
                .send()
                .await
                .map_err(|e| EngineClientError::request(&path, e))?;
            Self::check_status(&path, response).await.map(|_| ())
        })
        .await
    }

    pub async fn bpmn_error(
        &self,
        task_id: &str,
        error_code: &str,
        error_message: &str,
        variables: VariableMap,
    ) -> Result<(), EngineClientError> {
        let path = format!("/external-task/{task_id}/bpmnError");
        self.guarded(&path, async {
            let response = self
                .authed(self.http.post(self.url(&path)))
                .json(&BpmnErrorRequest {
                    worker_id: &self.worker_id,
                    error_code,
                    error_message,
                    variables,
                })
                .send()
                .await
                .map_err(|e| EngineClientError::request(&path, e))?;
            Self::check_status(&path, response).await.map(|_| ())
        })
        .await
    }

    pub async fn unlock(&self, task_id: &str) -> Result<(), EngineClientError> {
        let path = format!("/external-task/{task_id}/unlock");
        self.guarded(&path, async {
            let response = self
                .authed(self.http.post(self.url(&path)))
                .json(&UnlockRequest {
                    worker_id: &self.worker_id,
                })
                .send()
                .await
                .map_err(|e| EngineClientError::request(&path, e))?;
            Self::check_status(&path, response).await.map(|_| ())
        })
        .await
    }

    pub async fn process_definition_xml(
        &self,
        process_definition_id: &str,
    ) -> Result<ProcessDefinitionXml, EngineClientError> {
        let path = format!("/process-definition/{process_definition_id}/xml");
        let response = self
            .authed(self.http.get(self.url(&path)))
            .send()
            .await
            .map_err(|e| EngineClientError::request(&path, e))?;
        let response = Self::check_status(&path, response).await?;
        response
            .json::<ProcessDefinitionXml>()
            .await
            .map_err(|e| EngineClientError::decode(&path, json_err(e)))
    }

    /// Lists currently locked external tasks, optionally filtered by
    /// worker id; used by the Recovery Utility.
    pub async fn list_locked_tasks(
        &self,
        worker_id: Option<&str>,
    ) -> Result<Vec<ExternalTask>, EngineClientError> {
        let path = "/external-task";
        let mut request = self.authed(self.http.get(self.url(path))).query(&[("locked", "true")]);
        if let Some(worker_id) = worker_id {
            request = request.query(&[("workerId", worker_id)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineClientError::request(path, e))?;
        let response = Self::check_status(path, response).await?;
        response
            .json::<Vec<ExternalTask>>()
            .await
            .map_err(|e| EngineClientError::decode(path, json_err(e)))
    }

    pub async fn task_status(&self, task_id: &str) -> Result<Option<ExternalTask>, EngineClientError> {
        let path = format!("/external-task/{task_id}");
        self.guarded(&path, async {
            let response = self
                .authed(self.http.get(self.url(&path)))
                .send()
                .await
                .map_err(|e| EngineClientError::request(&path, e))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let response = Self::check_status(&path, response).await?;
            response
                .json::<ExternalTask>()
                .await
                .map(Some)
                .map_err(|e| EngineClientError::decode(&path, json_err(e)))
        })
        .await
    }

    /// Lists deployed process definitions; used by `bridge-ctl process definition list`.
    pub async fn list_process_definitions(&self) -> Result<Vec<ProcessDefinition>, EngineClientError> {
        let path = "/process-definition";
        let response = self
            .authed(self.http.get(self.url(path)))
            .send()
            .await
            .map_err(|e| EngineClientError::request(path, e))?;
        let response = Self::check_status(path, response).await?;
        response
            .json::<Vec<ProcessDefinition>>()
            .await
            .map_err(|e| EngineClientError::decode(path, json_err(e)))
    }

    pub async fn process_definition_info(
        &self,
        definition_id: &str,
    ) -> Result<Option<ProcessDefinition>, EngineClientError> {
        let path = format!("/process-definition/{definition_id}");
        let response = self
            .authed(self.http.get(self.url(&path)))
            .send()
            .await
            .map_err(|e| EngineClientError::request(&path, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(&path, response).await?;
        response
            .json::<ProcessDefinition>()
            .await
            .map(Some)
            .map_err(|e| EngineClientError::decode(&path, json_err(e)))
    }

    /// Lists running process instances; used by `bridge-ctl process instance list`.
    pub async fn list_process_instances(&self) -> Result<Vec<ProcessInstance>, EngineClientError> {
        let path = "/process-instance";
        let response = self
            .authed(self.http.get(self.url(path)))
            .send()
            .await
            .map_err(|e| EngineClientError::request(path, e))?;
        let response = Self::check_status(path, response).await?;
        response
            .json::<Vec<ProcessInstance>>()
            .await
            .map_err(|e| EngineClientError::decode(path, json_err(e)))
    }

    pub async fn start_process_instance(
        &self,
        definition_id: &str,
        variables: VariableMap,
    ) -> Result<ProcessInstance, EngineClientError> {
        let path = format!("/process-definition/{definition_id}/start");
        let response = self
            .authed(self.http.post(self.url(&path)))
            .json(&StartProcessInstanceRequest { variables })
            .send()
            .await
            .map_err(|e| EngineClientError::request(&path, e))?;
        let response = Self::check_status(&path, response).await?;
        response
            .json::<ProcessInstance>()
            .await
            .map_err(|e| EngineClientError::decode(&path, json_err(e)))
    }

    /// Suspends a running process instance (`bridge-ctl process instance stop`).
    pub async fn stop_process_instance(&self, instance_id: &str) -> Result<(), EngineClientError> {
        let path = format!("/process-instance/{instance_id}/suspended");
        let response = self
            .authed(self.http.put(self.url(&path)))
            .json(&SuspendRequest { suspended: true })
            .send()
            .await
            .map_err(|e| EngineClientError::request(&path, e))?;
        Self::check_status(&path, response).await.map(|_| ())
    }

    pub async fn delete_process_instance(
        &self,
        instance_id: &str,
        reason: Option<&str>,
    ) -> Result<(), EngineClientError> {
        let path = format!("/process-instance/{instance_id}");
        let response = self
            .authed(self.http.delete(self.url(&path)))
            .query(&DeleteProcessInstanceQuery { delete_reason: reason })
            .send()
            .await
            .map_err(|e| EngineClientError::request(&path, e))?;
        Self::check_status(&path, response).await.map(|_| ())
    }
}

fn json_err(e: reqwest::Error) -> serde_json::Error {
    use serde::de::Error as _;
    serde_json::Error::custom(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let client = EngineClient::new(
            "http://localhost:8080/engine-rest/",
            "worker-1",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.url("/external-task"), "http://localhost:8080/engine-rest/external-task");
    }
}
