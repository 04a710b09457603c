//! S3 as an [`ObjectStore`], path-style addressing.

use super::sigv4::{self, Credentials};
use super::{error_from_body, host_header, http_client, xml, AwsConfig};
use crate::backend::object::{ObjectStore, ObjectStoreBackend, ACL, CONTENT_TYPE};
use crate::backend::{Backend, BackendConfig};
use crate::error::{Result, RtError};
use chrono::Utc;
use reqwest::blocking::{Client, Response};

pub struct S3Store {
    http: Client,
    creds: Credentials,
    region: String,
    endpoint: String,
    bucket: String,
}

impl S3Store {
    pub fn new(cfg: &AwsConfig, creds: Credentials, bucket: &str) -> Result<Self> {
        Ok(S3Store {
            http: http_client()?,
            creds,
            region: cfg.region.clone(),
            endpoint: cfg.endpoint_for("s3"),
            bucket: bucket.to_string(),
        })
    }

    fn object_path(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, sigv4::uri_encode(key, false))
    }

    fn send(
        &self,
        method: &str,
        path: &str,
        query: &[(String, String)],
        extra_headers: &[(String, String)],
        body: &[u8],
    ) -> Result<Response> {
        let host = host_header(&self.endpoint)?;
        let req = sigv4::Request {
            method,
            host: &host,
            path,
            query,
            headers: extra_headers,
            payload: body,
        };
        let signed = sigv4::sign(&self.creds, &self.region, "s3", &req, Utc::now());

        let mut url = format!("{}{path}", self.endpoint);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&sigv4::canonical_query(query));
        }
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| RtError::Http(e.to_string()))?;
        let mut builder = self.http.request(method, url);
        for (k, v) in &signed.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        Ok(builder.body(body.to_vec()).send()?)
    }
}

fn failure(resp: Response) -> RtError {
    let status = resp.status().as_u16();
    let body = resp.text().unwrap_or_default();
    error_from_body(status, &body)
}

impl ObjectStore for S3Store {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = self.send("GET", &self.object_path(key), &[], &[], b"")?;
        if resp.status().is_success() {
            return Ok(Some(resp.bytes()?.to_vec()));
        }
        match failure(resp) {
            RtError::Cloud { code, .. } if code == "NoSuchKey" => Ok(None),
            other => Err(other),
        }
    }

    fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        let headers = [
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            ("x-amz-acl".to_string(), ACL.to_string()),
        ];
        let resp = self.send("PUT", &self.object_path(key), &[], &headers, body)?;
        if !resp.status().is_success() {
            return Err(failure(resp));
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let resp = self.send("DELETE", &self.object_path(key), &[], &[], b"")?;
        if !resp.status().is_success() {
            return Err(failure(resp));
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let path = format!("/{}", self.bucket);
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("prefix".to_string(), prefix.to_string()),
            ];
            if let Some(t) = &token {
                query.push(("continuation-token".to_string(), t.clone()));
            }
            let resp = self.send("GET", &path, &query, &[], b"")?;
            if !resp.status().is_success() {
                return Err(failure(resp));
            }
            let doc = xml::parse(&resp.text()?)?;
            keys.extend(doc.texts(&["Contents", "Key"]));
            let truncated = doc.text("IsTruncated").is_some_and(|t| t == "true");
            token = doc.text("NextContinuationToken");
            if !truncated || token.is_none() {
                break;
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// `s3` deployment-state backend: `bucket`, `prefix`, `region`, optional
/// `profile` and `endpoint`.
pub fn configure(cfg: &BackendConfig) -> Result<Box<dyn Backend>> {
    let bucket = cfg.required("bucket")?;
    let prefix = cfg.required("prefix")?;
    let region = cfg.required("region")?;
    let mut aws = AwsConfig::new(region, cfg.optional("profile"));
    aws.endpoint = cfg.optional("endpoint").map(str::to_string);
    let store = S3Store::new(&aws, aws.credentials()?, bucket)?;
    tracing::debug!(bucket, prefix, region, "configured s3 backend");
    Ok(Box::new(ObjectStoreBackend::new("s3", prefix, store)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ApplicationData;
    use mockito::{Matcher, Server};

    fn store(server: &Server) -> S3Store {
        let cfg = AwsConfig {
            region: "us-east-1".into(),
            profile: None,
            endpoint: Some(server.url()),
        };
        let creds = Credentials {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        };
        S3Store::new(&cfg, creds, "rt-state").unwrap()
    }

    const NO_SUCH_KEY: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
        <Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>";

    #[test]
    fn get_maps_missing_key_to_none() {
        let mut server = Server::new();
        let _found = server
            .mock("GET", "/rt-state/dev/hello/APPLICATION.json")
            .match_header("authorization", Matcher::Regex("^AWS4-HMAC-SHA256 ".into()))
            .match_header("x-amz-content-sha256", Matcher::Any)
            .with_status(200)
            .with_body("{\"v\":1}")
            .create();
        let _missing = server
            .mock("GET", "/rt-state/dev/nope/APPLICATION.json")
            .with_status(404)
            .with_body(NO_SUCH_KEY)
            .create();
        let s = store(&server);
        assert_eq!(
            s.get("dev/hello/APPLICATION.json").unwrap().unwrap(),
            b"{\"v\":1}"
        );
        assert_eq!(s.get("dev/nope/APPLICATION.json").unwrap(), None);
    }

    #[test]
    fn access_denied_is_an_error() {
        let mut server = Server::new();
        let _m = server
            .mock("GET", "/rt-state/dev")
            .with_status(403)
            .with_body("<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>")
            .create();
        let err = store(&server).get("dev").unwrap_err();
        assert!(matches!(err, RtError::Cloud { code, .. } if code == "AccessDenied"));
    }

    #[test]
    fn put_sends_content_type_and_acl() {
        let mut server = Server::new();
        let m = server
            .mock("PUT", "/rt-state/dev/hello/SLOT-blue.json")
            .match_header("content-type", CONTENT_TYPE)
            .match_header("x-amz-acl", ACL)
            .match_body("{}")
            .with_status(200)
            .create();
        store(&server).put("dev/hello/SLOT-blue.json", b"{}").unwrap();
        m.assert();
    }

    #[test]
    fn delete_accepts_no_content() {
        let mut server = Server::new();
        let m = server
            .mock("DELETE", "/rt-state/dev/hello/SLOT-blue.json")
            .with_status(204)
            .create();
        store(&server).delete("dev/hello/SLOT-blue.json").unwrap();
        m.assert();
    }

    #[test]
    fn list_follows_continuation_tokens() {
        let mut server = Server::new();
        let _first = server
            .mock("GET", "/rt-state")
            .match_query(Matcher::Exact("list-type=2&prefix=dev%2F".into()))
            .with_status(200)
            .with_body(
                "<ListBucketResult><IsTruncated>true</IsTruncated>\
                 <Contents><Key>dev/b/APPLICATION.json</Key></Contents>\
                 <NextContinuationToken>tok1</NextContinuationToken></ListBucketResult>",
            )
            .create();
        let _second = server
            .mock("GET", "/rt-state")
            .match_query(Matcher::Exact(
                "continuation-token=tok1&list-type=2&prefix=dev%2F".into(),
            ))
            .with_status(200)
            .with_body(
                "<ListBucketResult><IsTruncated>false</IsTruncated>\
                 <Contents><Key>dev/a/APPLICATION.json</Key></Contents></ListBucketResult>",
            )
            .create();
        let keys = store(&server).list("dev/").unwrap();
        assert_eq!(keys, vec!["dev/a/APPLICATION.json", "dev/b/APPLICATION.json"]);
    }

    #[test]
    fn backend_reads_applications_through_s3() {
        let mut server = Server::new();
        let body = ApplicationData::new("hello", "0.7.13").to_json().unwrap();
        let _m = server
            .mock("GET", "/rt-state/dev/hello/APPLICATION.json")
            .with_status(200)
            .with_body(body)
            .create();
        let backend = ObjectStoreBackend::new("s3", "dev/", store(&server));
        let app = backend.get_application("hello").unwrap();
        assert_eq!(app.name, "hello");
        assert_eq!(app.last_terraform_version, "0.7.13");
    }

    #[test]
    fn configure_requires_keys() {
        let mut cfg = BackendConfig {
            backend: "s3".into(),
            config: Default::default(),
        };
        cfg.config.insert("bucket".into(), "b".into());
        let err = configure(&cfg).err().unwrap();
        assert!(err.to_string().contains("\"prefix\""));
    }
}
