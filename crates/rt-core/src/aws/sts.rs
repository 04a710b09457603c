//! Who is calling: STS caller identity plus the operator's public address.

use super::{http_client, xml, AwsConfig, QueryApi};
use crate::error::{Result, RtError};
use crate::schema::DeployPilot;

pub const API_VERSION: &str = "2011-06-15";
pub const CHECK_IP_URL: &str = "https://checkip.amazonaws.com";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub arn: String,
    pub user_id: String,
    pub account_id: String,
    /// Last path segment of the ARN, e.g. `Bob` for `...:user/Bob`.
    pub name: String,
}

impl Identity {
    pub fn pilot(&self, ip_address: Option<&str>) -> DeployPilot {
        DeployPilot {
            aws_api_caller: self.arn.clone(),
            ip_address: ip_address.unwrap_or_default().to_string(),
        }
    }
}

pub fn username_from_arn(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

/// `sts:GetCallerIdentity`.
pub fn caller_identity(cfg: &AwsConfig) -> Result<Identity> {
    let api = QueryApi::new(cfg, cfg.credentials()?, "sts", API_VERSION)?;
    let body = api.call("GetCallerIdentity", &[])?;
    parse_identity(&body)
}

fn parse_identity(body: &str) -> Result<Identity> {
    let doc = xml::parse(body)?;
    let result = doc.child("GetCallerIdentityResult").ok_or_else(|| {
        RtError::Http("GetCallerIdentity: unexpected response".to_string())
    })?;
    let arn = result.text("Arn").unwrap_or_default();
    Ok(Identity {
        name: username_from_arn(&arn).to_string(),
        user_id: result.text("UserId").unwrap_or_default(),
        account_id: result.text("Account").unwrap_or_default(),
        arn,
    })
}

/// Public IP of this machine as seen by `url` (plain-text body).
pub fn public_ip(url: &str) -> Result<String> {
    let resp = http_client()?.get(url).send()?;
    if !resp.status().is_success() {
        return Err(RtError::Http(format!("{url}: HTTP {}", resp.status())));
    }
    let ip = resp.text()?.trim().to_string();
    if ip.is_empty() {
        return Err(RtError::Http(format!("{url}: empty response")));
    }
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    const IDENTITY: &str = r#"<GetCallerIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <GetCallerIdentityResult>
   <Arn>arn:aws:iam::123456789012:user/Bob</Arn>
    <UserId>AKIAI44QH8DHBEXAMPLE</UserId>
    <Account>123456789012</Account>
  </GetCallerIdentityResult>
  <ResponseMetadata>
    <RequestId>01234567-89ab-cdef-0123-456789abcdef</RequestId>
  </ResponseMetadata>
</GetCallerIdentityResponse>"#;

    #[test]
    fn usernames_from_arns() {
        assert_eq!(username_from_arn("arn:aws:iam::9991112224:user/radek.simko"), "radek.simko");
        assert_eq!(username_from_arn("arn:aws:iam::0123456789:user/ian"), "ian");
        assert_eq!(username_from_arn("arn:aws:iam::0123456789:root"), "arn:aws:iam::0123456789:root");
    }

    #[test]
    fn caller_identity_over_http() {
        let mut server = Server::new();
        let m = server
            .mock("POST", "/")
            .match_body("Action=GetCallerIdentity&Version=2011-06-15")
            .with_status(200)
            .with_body(IDENTITY)
            .create();
        let cfg = AwsConfig {
            endpoint: Some(server.url()),
            ..AwsConfig::default()
        };
        let creds = crate::aws::sigv4::Credentials {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        };
        let api = QueryApi::new(&cfg, creds, "sts", API_VERSION).unwrap();
        let id = parse_identity(&api.call("GetCallerIdentity", &[]).unwrap()).unwrap();
        m.assert();
        assert_eq!(id.account_id, "123456789012");
        assert_eq!(id.name, "Bob");
        assert_eq!(id.user_id, "AKIAI44QH8DHBEXAMPLE");
        assert_eq!(id.pilot(Some("8.8.8.8")).aws_api_caller, id.arn);
    }

    #[test]
    fn public_ip_is_trimmed() {
        let mut server = Server::new();
        let _m = server.mock("GET", "/").with_body("203.0.113.7\n").create();
        assert_eq!(public_ip(&server.url()).unwrap(), "203.0.113.7");
    }
}
