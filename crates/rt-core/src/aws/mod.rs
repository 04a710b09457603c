//! Minimal AWS clients over reqwest: SigV4 signing, the query-protocol APIs
//! (Auto Scaling, classic ELB, EC2, STS) and S3 object storage.

pub mod cloud;
pub mod credentials;
pub mod s3;
pub mod sigv4;
pub mod sts;
pub mod xml;

use crate::error::{Result, RtError};
use chrono::Utc;
use reqwest::blocking::Client;
use sigv4::Credentials;
use std::time::Duration;

pub const DEFAULT_REGION: &str = "us-east-1";

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Where and as whom to talk to AWS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    pub region: String,
    /// Named profile in the shared credentials file. `None` lets environment
    /// credentials win.
    pub profile: Option<String>,
    /// Base URL replacing every service endpoint (tests, local emulators).
    pub endpoint: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        AwsConfig {
            region: DEFAULT_REGION.to_string(),
            profile: None,
            endpoint: None,
        }
    }
}

impl AwsConfig {
    pub fn new(region: &str, profile: Option<&str>) -> Self {
        AwsConfig {
            region: region.to_string(),
            profile: profile.filter(|p| !p.is_empty()).map(str::to_string),
            endpoint: None,
        }
    }

    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::resolve(self.profile.as_deref())
    }

    /// Endpoint of a regional `service`, e.g. `https://autoscaling.eu-west-1.amazonaws.com`.
    pub fn endpoint_for(&self, service: &str) -> String {
        if let Some(e) = &self.endpoint {
            return e.trim_end_matches('/').to_string();
        }
        match service {
            "sts" => "https://sts.amazonaws.com".to_string(),
            _ => format!("https://{service}.{}.amazonaws.com", self.region),
        }
    }
}

pub(crate) fn http_client() -> Result<Client> {
    Ok(Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

/// `host[:port]` as it appears in the Host header.
pub(crate) fn host_header(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| RtError::Http(format!("{url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| RtError::Http(format!("{url}: no host")))?;
    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// The `<Code>`/`<Message>` pair of an AWS error document.
pub(crate) fn error_from_body(status: u16, body: &str) -> RtError {
    let doc = xml::parse(body).unwrap_or_default();
    let code = doc.texts(&["Error", "Code"]).into_iter().next();
    let message = doc.texts(&["Error", "Message"]).into_iter().next();
    RtError::Cloud {
        code: code.unwrap_or_else(|| format!("HTTP{status}")),
        message: message.unwrap_or_else(|| body.trim().to_string()),
    }
}

// ---------------------------------------------------------------------------
// Query protocol
// ---------------------------------------------------------------------------

/// One AWS service speaking the query protocol: form-encoded POST with
/// `Action` and `Version`, XML responses.
pub struct QueryApi {
    http: Client,
    creds: Credentials,
    region: String,
    service: &'static str,
    version: &'static str,
    endpoint: String,
}

impl QueryApi {
    pub fn new(
        cfg: &AwsConfig,
        creds: Credentials,
        service: &'static str,
        version: &'static str,
    ) -> Result<Self> {
        Ok(QueryApi {
            http: http_client()?,
            creds,
            region: cfg.region.clone(),
            service,
            version,
            endpoint: cfg.endpoint_for(service),
        })
    }

    /// Call `action` with `params` and return the raw XML response.
    pub fn call(&self, action: &str, params: &[(String, String)]) -> Result<String> {
        let mut form: Vec<(String, String)> = params.to_vec();
        form.push(("Action".into(), action.into()));
        form.push(("Version".into(), self.version.into()));
        let body = sigv4::canonical_query(&form);

        let host = host_header(&self.endpoint)?;
        let content_type = (
            "content-type".to_string(),
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        );
        let req = sigv4::Request {
            method: "POST",
            host: &host,
            path: "/",
            query: &[],
            headers: std::slice::from_ref(&content_type),
            payload: body.as_bytes(),
        };
        // STS is global but signs in us-east-1.
        let signing_region = if self.service == "sts" {
            DEFAULT_REGION
        } else {
            &self.region
        };
        let signed = sigv4::sign(&self.creds, signing_region, self.service, &req, Utc::now());

        tracing::debug!(service = self.service, action, "aws query request");
        let mut builder = self.http.post(format!("{}/", self.endpoint));
        for (k, v) in &signed.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        let resp = builder.body(body).send()?;
        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            let err = error_from_body(status.as_u16(), &text);
            tracing::debug!(service = self.service, action, %err, "aws query failed");
            return Err(err);
        }
        Ok(text)
    }
}

/// `prefix.1=v1`, `prefix.2=v2`, ...
pub(crate) fn member_list(prefix: &str, values: &[String]) -> Vec<(String, String)> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (format!("{prefix}.{}", i + 1), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints() {
        let cfg = AwsConfig::new("eu-west-1", Some(""));
        assert_eq!(cfg.profile, None);
        assert_eq!(
            cfg.endpoint_for("autoscaling"),
            "https://autoscaling.eu-west-1.amazonaws.com"
        );
        assert_eq!(cfg.endpoint_for("sts"), "https://sts.amazonaws.com");
        let local = AwsConfig {
            endpoint: Some("http://127.0.0.1:4566/".into()),
            ..cfg
        };
        assert_eq!(local.endpoint_for("ec2"), "http://127.0.0.1:4566");
    }

    #[test]
    fn host_headers_keep_explicit_ports() {
        assert_eq!(host_header("http://127.0.0.1:4566").unwrap(), "127.0.0.1:4566");
        assert_eq!(
            host_header("https://s3.us-east-1.amazonaws.com").unwrap(),
            "s3.us-east-1.amazonaws.com"
        );
    }

    #[test]
    fn error_documents() {
        let body = "<ErrorResponse><Error><Type>Sender</Type><Code>ValidationError</Code>\
                    <Message>Trying to remove Load Balancers that are not part of the group</Message>\
                    </Error></ErrorResponse>";
        match error_from_body(400, body) {
            RtError::Cloud { code, message } => {
                assert_eq!(code, "ValidationError");
                assert!(message.starts_with("Trying to remove"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let ec2 = "<Response><Errors><Error><Code>InvalidInstanceID.NotFound</Code>\
                   <Message>nope</Message></Error></Errors></Response>";
        assert!(matches!(error_from_body(400, ec2), RtError::Cloud { code, .. } if code == "InvalidInstanceID.NotFound"));
        assert!(matches!(error_from_body(502, "bad gateway"), RtError::Cloud { code, .. } if code == "HTTP502"));
    }

    #[test]
    fn member_lists_are_one_based() {
        let l = member_list("LoadBalancerNames.member", &["a".into(), "b".into()]);
        assert_eq!(l[0], ("LoadBalancerNames.member.1".to_string(), "a".to_string()));
        assert_eq!(l[1].0, "LoadBalancerNames.member.2");
    }
}
