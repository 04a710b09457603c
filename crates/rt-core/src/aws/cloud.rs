//! [`Cloud`] over the Auto Scaling, classic ELB and EC2 query APIs.

use super::{member_list, xml, AwsConfig, QueryApi};
use crate::error::Result;
use crate::traffic::{Balancer, Cloud, InstanceHealth, Reservation};
use std::collections::BTreeMap;

pub const AUTOSCALING_VERSION: &str = "2011-01-01";
pub const ELB_VERSION: &str = "2012-06-01";
pub const EC2_VERSION: &str = "2016-11-15";

pub struct AwsCloud {
    region: String,
    autoscaling: QueryApi,
    elb: QueryApi,
    ec2: QueryApi,
}

fn param(k: &str, v: &str) -> (String, String) {
    (k.to_string(), v.to_string())
}

impl AwsCloud {
    pub fn new(cfg: &AwsConfig) -> Result<Self> {
        let creds = cfg.credentials()?;
        Ok(AwsCloud {
            region: cfg.region.clone(),
            autoscaling: QueryApi::new(cfg, creds.clone(), "autoscaling", AUTOSCALING_VERSION)?,
            elb: QueryApi::new(cfg, creds.clone(), "elasticloadbalancing", ELB_VERSION)?,
            ec2: QueryApi::new(cfg, creds, "ec2", EC2_VERSION)?,
        })
    }
}

impl Cloud for AwsCloud {
    fn region(&self) -> &str {
        &self.region
    }

    fn scaling_group_ids_by_tag(&self, key: &str, value: &str) -> Result<Vec<String>> {
        let body = self.autoscaling.call(
            "DescribeTags",
            &[
                param("Filters.member.1.Name", "key"),
                param("Filters.member.1.Values.member.1", key),
                param("Filters.member.2.Name", "value"),
                param("Filters.member.2.Values.member.1", value),
            ],
        )?;
        Ok(xml::parse(&body)?.texts(&["Tags", "member", "ResourceId"]))
    }

    fn scaling_group_instance_ids(&self, group: &str) -> Result<Vec<String>> {
        let body = self.autoscaling.call(
            "DescribeAutoScalingGroups",
            &[param("AutoScalingGroupNames.member.1", group)],
        )?;
        let doc = xml::parse(&body)?;
        let Some(first) = doc.items("AutoScalingGroups", "member").into_iter().next() else {
            return Ok(Vec::new());
        };
        Ok(first.texts(&["Instances", "member", "InstanceId"]))
    }

    fn scaling_group_balancers(&self, group: &str) -> Result<Vec<Balancer>> {
        tracing::debug!(group, "discovering balancers for scaling group");
        let body = self
            .autoscaling
            .call("DescribeLoadBalancers", &[param("AutoScalingGroupName", group)])?;
        let doc = xml::parse(&body)?;
        Ok(doc
            .items("LoadBalancers", "member")
            .into_iter()
            .map(|m| Balancer {
                name: m.text("LoadBalancerName").unwrap_or_default(),
                state: m.text("State").unwrap_or_default(),
            })
            .collect())
    }

    fn load_balancer_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let params: Vec<_> = marker.iter().map(|m| param("Marker", m)).collect();
            let doc = xml::parse(&self.elb.call("DescribeLoadBalancers", &params)?)?;
            names.extend(doc.texts(&["LoadBalancerDescriptions", "member", "LoadBalancerName"]));
            marker = doc.text("NextMarker").filter(|m| !m.is_empty());
            if marker.is_none() {
                break;
            }
        }
        Ok(names)
    }

    fn load_balancer_tags(&self, names: &[String]) -> Result<Vec<(String, BTreeMap<String, String>)>> {
        tracing::debug!(?names, "checking tags for load balancers");
        let body = self
            .elb
            .call("DescribeTags", &member_list("LoadBalancerNames.member", names))?;
        let doc = xml::parse(&body)?;
        Ok(doc
            .items("TagDescriptions", "member")
            .into_iter()
            .map(|d| {
                let name = d.text("LoadBalancerName").unwrap_or_default();
                let tags = d
                    .items("Tags", "member")
                    .into_iter()
                    .filter_map(|t| Some((t.text("Key")?, t.text("Value").unwrap_or_default())))
                    .collect();
                (name, tags)
            })
            .collect())
    }

    fn instance_health(&self, balancer: &str) -> Result<Vec<InstanceHealth>> {
        let body = self
            .elb
            .call("DescribeInstanceHealth", &[param("LoadBalancerName", balancer)])?;
        let doc = xml::parse(&body)?;
        Ok(doc
            .items("InstanceStates", "member")
            .into_iter()
            .map(|m| InstanceHealth {
                instance_id: m.text("InstanceId").unwrap_or_default(),
                state: m.text("State").unwrap_or_default(),
            })
            .collect())
    }

    fn attach_load_balancers(&self, group: &str, balancers: &[String]) -> Result<()> {
        let mut params = vec![param("AutoScalingGroupName", group)];
        params.extend(member_list("LoadBalancerNames.member", balancers));
        self.autoscaling.call("AttachLoadBalancers", &params)?;
        Ok(())
    }

    fn detach_load_balancers(&self, group: &str, balancers: &[String]) -> Result<()> {
        let mut params = vec![param("AutoScalingGroupName", group)];
        params.extend(member_list("LoadBalancerNames.member", balancers));
        self.autoscaling.call("DetachLoadBalancers", &params)?;
        Ok(())
    }

    fn describe_instances(&self, instance_ids: &[String]) -> Result<Vec<Reservation>> {
        let body = self
            .ec2
            .call("DescribeInstances", &member_list("InstanceId", instance_ids))?;
        let doc = xml::parse(&body)?;
        Ok(doc
            .items("reservationSet", "item")
            .into_iter()
            .map(|r| Reservation {
                instances: r
                    .items("instancesSet", "item")
                    .into_iter()
                    .map(|i| {
                        (
                            i.text("instanceId").unwrap_or_default(),
                            i.text("privateIpAddress").unwrap_or_default(),
                        )
                    })
                    .collect(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::sigv4::Credentials;
    use crate::error::RtError;
    use crate::traffic::TrafficController;
    use mockito::{Matcher, Server};

    fn cloud(server: &Server) -> AwsCloud {
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
        AwsCloud {
            region: cfg.region.clone(),
            autoscaling: QueryApi::new(&cfg, creds.clone(), "autoscaling", AUTOSCALING_VERSION)
                .unwrap(),
            elb: QueryApi::new(&cfg, creds.clone(), "elasticloadbalancing", ELB_VERSION).unwrap(),
            ec2: QueryApi::new(&cfg, creds, "ec2", EC2_VERSION).unwrap(),
        }
    }

    const ASG_TAGS: &str = r#"<DescribeTagsResponse xmlns="http://autoscaling.amazonaws.com/doc/2011-01-01/">
  <DescribeTagsResult>
    <Tags>
      <member>
        <ResourceId>test-decanter-wine-api-vstable13-vasg</ResourceId>
        <PropagateAtLaunch>true</PropagateAtLaunch>
        <Value>test-decanter-wine-api-vstable13-vinst</Value>
        <Key>Name</Key>
        <ResourceType>auto-scaling-group</ResourceType>
      </member>
    </Tags>
  </DescribeTagsResult>
</DescribeTagsResponse>"#;

    const ASG_BALANCERS: &str = r#"<DescribeLoadBalancersResponse xmlns="http://autoscaling.amazonaws.com/doc/2011-01-01/">
  <DescribeLoadBalancersResult>
    <LoadBalancers>
      <member>
        <LoadBalancerName>tf-lb-decanter-wine-api</LoadBalancerName>
        <State>Added</State>
      </member>
    </LoadBalancers>
  </DescribeLoadBalancersResult>
</DescribeLoadBalancersResponse>"#;

    const ASG_GROUPS: &str = r#"<DescribeAutoScalingGroupsResponse xmlns="http://autoscaling.amazonaws.com/doc/2011-01-01/">
  <DescribeAutoScalingGroupsResult>
    <AutoScalingGroups>
      <member>
        <LoadBalancerNames>
          <member>tf-lb-decanter-wine-api</member>
        </LoadBalancerNames>
        <Instances>
          <member>
            <LifecycleState>InService</LifecycleState>
            <InstanceId>i-ee546206</InstanceId>
            <HealthStatus>Healthy</HealthStatus>
          </member>
        </Instances>
        <EnabledMetrics/>
        <Tags>
          <member>
            <ResourceId>test-decanter-wine-api-vstable13-vasg</ResourceId>
            <Value>decanter-wine-api</Value>
            <Key>App</Key>
          </member>
        </Tags>
        <AutoScalingGroupName>test-decanter-wine-api-vstable13-vasg</AutoScalingGroupName>
      </member>
    </AutoScalingGroups>
  </DescribeAutoScalingGroupsResult>
</DescribeAutoScalingGroupsResponse>"#;

    const ELB_HEALTH: &str = r#"<DescribeInstanceHealthResponse xmlns="http://elasticloadbalancing.amazonaws.com/doc/2012-06-01/">
  <DescribeInstanceHealthResult>
    <InstanceStates>
      <member>
        <Description>N/A</Description>
        <InstanceId>i-ee546206</InstanceId>
        <ReasonCode>N/A</ReasonCode>
        <State>InService</State>
      </member>
    </InstanceStates>
  </DescribeInstanceHealthResult>
</DescribeInstanceHealthResponse>"#;

    const EC2_INSTANCES: &str = r#"<DescribeInstancesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
    <reservationSet>
        <item>
            <reservationId>r-a88d4c20</reservationId>
            <groupSet/>
            <instancesSet>
                <item>
                    <instanceId>i-ee546206</instanceId>
                    <privateDnsName>ip-10-108-38-201.eu-west-1.compute.internal</privateDnsName>
                    <privateIpAddress>10.108.38.201</privateIpAddress>
                    <groupSet>
                        <item>
                            <groupId>sg-1e309278</groupId>
                        </item>
                    </groupSet>
                    <networkInterfaceSet>
                        <item>
                            <privateIpAddress>10.108.38.201</privateIpAddress>
                        </item>
                    </networkInterfaceSet>
                </item>
            </instancesSet>
        </item>
    </reservationSet>
</DescribeInstancesResponse>"#;

    #[test]
    fn scaling_group_from_name_tag() {
        let mut server = Server::new();
        let m = server
            .mock("POST", "/")
            .match_body(
                "Action=DescribeTags&Filters.member.1.Name=key&Filters.member.1.Values.member.1=Name\
                 &Filters.member.2.Name=value&Filters.member.2.Values.member.1=test-decanter-wine-api-vstable13-vinst\
                 &Version=2011-01-01",
            )
            .with_body(ASG_TAGS)
            .create();
        let c = cloud(&server);
        let tc = TrafficController::new(&c, "test", "decanter-wine-api");
        assert_eq!(
            tc.scaling_group_for_slot("stable13").unwrap().as_deref(),
            Some("test-decanter-wine-api-vstable13-vasg")
        );
        m.assert();
    }

    #[test]
    fn group_queries() {
        let mut server = Server::new();
        let _b = server
            .mock("POST", "/")
            .match_body(
                "Action=DescribeLoadBalancers&AutoScalingGroupName=my-asg&Version=2011-01-01",
            )
            .with_body(ASG_BALANCERS)
            .create();
        let _g = server
            .mock("POST", "/")
            .match_body(
                "Action=DescribeAutoScalingGroups&AutoScalingGroupNames.member.1=my-asg&Version=2011-01-01",
            )
            .with_body(ASG_GROUPS)
            .create();
        let c = cloud(&server);
        assert_eq!(
            c.scaling_group_balancers("my-asg").unwrap(),
            vec![Balancer {
                name: "tf-lb-decanter-wine-api".into(),
                state: "Added".into()
            }]
        );
        assert_eq!(c.scaling_group_instance_ids("my-asg").unwrap(), vec!["i-ee546206"]);
    }

    #[test]
    fn health_and_addresses() {
        let mut server = Server::new();
        let _h = server
            .mock("POST", "/")
            .match_body(
                "Action=DescribeInstanceHealth&LoadBalancerName=tf-lb-decanter-wine-api&Version=2012-06-01",
            )
            .with_body(ELB_HEALTH)
            .create();
        let _i = server
            .mock("POST", "/")
            .match_body("Action=DescribeInstances&InstanceId.1=i-ee546206&Version=2016-11-15")
            .with_body(EC2_INSTANCES)
            .create();
        let c = cloud(&server);
        assert_eq!(
            c.instance_health("tf-lb-decanter-wine-api").unwrap(),
            vec![InstanceHealth {
                instance_id: "i-ee546206".into(),
                state: "InService".into()
            }]
        );
        let tc = TrafficController::new(&c, "test", "decanter-wine-api");
        let ips = tc.private_ips(&["i-ee546206".into()]).unwrap();
        assert_eq!(ips["i-ee546206"], "10.108.38.201");
    }

    #[test]
    fn balancer_listing_pages_and_tags() {
        let mut server = Server::new();
        let _p1 = server
            .mock("POST", "/")
            .match_body("Action=DescribeLoadBalancers&Version=2012-06-01")
            .with_body(
                "<DescribeLoadBalancersResponse><DescribeLoadBalancersResult>\
                 <LoadBalancerDescriptions><member><LoadBalancerName>lb-a</LoadBalancerName>\
                 <Instances><member><InstanceId>i-1</InstanceId></member></Instances></member>\
                 </LoadBalancerDescriptions><NextMarker>m1</NextMarker>\
                 </DescribeLoadBalancersResult></DescribeLoadBalancersResponse>",
            )
            .create();
        let _p2 = server
            .mock("POST", "/")
            .match_body("Action=DescribeLoadBalancers&Marker=m1&Version=2012-06-01")
            .with_body(
                "<DescribeLoadBalancersResponse><DescribeLoadBalancersResult>\
                 <LoadBalancerDescriptions><member><LoadBalancerName>lb-b</LoadBalancerName></member>\
                 </LoadBalancerDescriptions></DescribeLoadBalancersResult></DescribeLoadBalancersResponse>",
            )
            .create();
        let _tags = server
            .mock("POST", "/")
            .match_body(
                "Action=DescribeTags&LoadBalancerNames.member.1=lb-a&LoadBalancerNames.member.2=lb-b&Version=2012-06-01",
            )
            .with_body(
                "<DescribeTagsResponse><DescribeTagsResult><TagDescriptions>\
                 <member><LoadBalancerName>lb-a</LoadBalancerName><Tags>\
                 <member><Key>App</Key><Value>other</Value></member></Tags></member>\
                 <member><LoadBalancerName>lb-b</LoadBalancerName><Tags>\
                 <member><Key>App</Key><Value>hello</Value></member></Tags></member>\
                 </TagDescriptions></DescribeTagsResult></DescribeTagsResponse>",
            )
            .create();
        let c = cloud(&server);
        assert_eq!(c.load_balancer_names().unwrap(), vec!["lb-a", "lb-b"]);
        let tc = TrafficController::new(&c, "test", "hello");
        assert_eq!(tc.balancers_for_app().unwrap(), vec!["lb-b"]);
    }

    #[test]
    fn detach_validation_error() {
        let mut server = Server::new();
        let _d = server
            .mock("POST", "/")
            .match_body(Matcher::Regex("^Action=DetachLoadBalancers&".into()))
            .with_status(400)
            .with_body(
                "<ErrorResponse><Error><Type>Sender</Type><Code>ValidationError</Code>\
                 <Message>Trying to remove Load Balancers that are not part of the group</Message>\
                 </Error></ErrorResponse>",
            )
            .create();
        let c = cloud(&server);
        let tc = TrafficController::new(&c, "test", "hello");
        let err = tc.detach("my-asg", &["lb-b".into()]).unwrap_err();
        assert!(matches!(err, RtError::BalancersNotAttached(g) if g == "my-asg"));
    }
}
