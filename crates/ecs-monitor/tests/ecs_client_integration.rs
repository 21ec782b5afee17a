//! ECS client against a local HTTP server standing in for the RPC endpoint

use chrono::Utc;
use ecs_monitor::cloud::signer;
use ecs_monitor::cloud::{
    CloudError, Credential, CredentialStore, EcsClient, EcsOperations, InstanceQuery, RetryPolicy,
    classify_anyhow_error, query_instances, query_networks,
};
use ecs_monitor_common::{FilterRule, Tag};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const SECRET: &str = "test-secret";

/// Matches requests whose signature verifies against `secret`
struct ValidSignature {
    secret: &'static str,
}

impl Match for ValidSignature {
    fn matches(&self, request: &Request) -> bool {
        let mut params: BTreeMap<String, String> = request
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let Some(signature) = params.remove("Signature") else {
            return false;
        };
        signer::sign(&params, self.secret).is_ok_and(|expected| expected == signature)
    }
}

fn client(server: &MockServer, store: CredentialStore) -> EcsClient {
    EcsClient::with_endpoint(store, server.uri())
        .unwrap()
        .with_retry_policy(RetryPolicy {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            max_retries: 3,
        })
}

fn static_store() -> CredentialStore {
    CredentialStore::new(Credential::fixed("AK-static", SECRET, "cn-hangzhou"))
}

fn instances_body(total: u32, ids: &[&str]) -> serde_json::Value {
    json!({
        "RequestId": "req",
        "TotalCount": total,
        "Instances": {"Instance": ids.iter().map(|id| json!({
            "InstanceId": id,
            "InstanceName": format!("worker-k8s-{id}"),
            "InstanceType": "ecs.g6.large",
            "SpotStrategy": "NoSpot",
            "VpcAttributes": {"VpcId": "vpc-1"},
            "Tags": {"Tag": []}
        })).collect::<Vec<_>>()}
    })
}

#[tokio::test]
async fn test_signed_describe_instances_pages() {
    let server = MockServer::start().await;
    for (page, ids) in [("1", vec!["i-1", "i-2"]), ("2", vec!["i-3"])] {
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("Action", "DescribeInstances"))
            .and(query_param("Format", "JSON"))
            .and(query_param("Version", "2014-05-26"))
            .and(query_param("RegionId", "cn-hangzhou"))
            .and(query_param("PageNumber", page))
            .and(query_param("PageSize", "2"))
            .and(query_param("Tag.1.Key", "cluster"))
            .and(query_param("Tag.1.Value", "prod"))
            .and(ValidSignature { secret: SECRET })
            .respond_with(ResponseTemplate::new(200).set_body_json(instances_body(3, &ids)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = client(&server, static_store());
    let rule = FilterRule::new(&[] as &[&str], vec![Tag::new("cluster", "prod")], &[], &[]).unwrap();
    let found = query_instances(&client, &InstanceQuery::new(rule, 2)).await.unwrap();

    let ids: Vec<_> = found.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["i-1", "i-2", "i-3"]);
    assert_eq!(found[0].network_id, "vpc-1");
}

#[tokio::test]
async fn test_networks_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("Action", "DescribeVpcs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "TotalCount": 2,
            "Vpcs": {"Vpc": [
                {"VpcId": "vpc-1", "VpcName": "dev"},
                {"VpcId": "vpc-2", "VpcName": "prod"}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let lookup = query_networks(&client(&server, static_store()), 10).await.unwrap();
    assert_eq!(lookup.environment("vpc-1"), Some("develop"));
    assert_eq!(lookup.environment("vpc-2"), Some("prod"));
}

#[tokio::test]
async fn test_session_token_follows_refresh() {
    let server = MockServer::start().await;
    for (key, token) in [("STS.one", "token-one"), ("STS.two", "token-two")] {
        Mock::given(method("GET"))
            .and(query_param("Action", "AddTags"))
            .and(query_param("AccessKeyId", key))
            .and(query_param("SecurityToken", token))
            .and(query_param("ResourceType", "instance"))
            .and(query_param("ResourceId", "i-1"))
            .and(query_param("Tag.1.Key", "Environment"))
            .and(query_param("Tag.1.Value", "prod"))
            .and(ValidSignature { secret: SECRET })
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"RequestId": "req"})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let role = |key: &str, token: &str| Credential {
        access_key_id: key.to_string(),
        access_key_secret: SECRET.to_string(),
        session_token: Some(token.to_string()),
        expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        region_id: "cn-hangzhou".to_string(),
    };
    let store = CredentialStore::new(role("STS.one", "token-one"));
    let client = client(&server, store.clone());
    let tags = [Tag::new("Environment", "prod")];

    client.apply_tags("i-1", &tags).await.unwrap();
    store.replace(role("STS.two", "token-two"));
    client.apply_tags("i-1", &tags).await.unwrap();
}

#[tokio::test]
async fn test_throttling_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("Action", "DescribeVpcs"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "RequestId": "req-throttled",
            "Code": "Throttling.User",
            "Message": "Request was denied due to user flow control."
        })))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("Action", "DescribeVpcs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "TotalCount": 0,
            "Vpcs": {"Vpc": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = client(&server, static_store()).list_networks_page(1, 10).await.unwrap();
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_permanent_error_surfaces_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("Action", "AddTags"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "RequestId": "req-404",
            "Code": "InvalidInstanceId.NotFound",
            "Message": "The specified InstanceId does not exist."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, static_store())
        .apply_tags("i-gone", &[Tag::new("role", "worker")])
        .await
        .unwrap_err();

    let chain = format!("{err:#}");
    assert!(chain.contains("AddTags failed for i-gone"), "{chain}");
    assert!(chain.contains("req-404"), "{chain}");
    let cloud_err = classify_anyhow_error(&err).unwrap();
    assert!(cloud_err.is_not_found());
    assert!(!cloud_err.is_throttled());
}

#[tokio::test]
async fn test_non_json_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let err = client(&server, static_store())
        .list_networks_page(1, 10)
        .await
        .unwrap_err();
    match classify_anyhow_error(&err) {
        Some(CloudError::Api { status, code, .. }) => {
            assert_eq!(*status, 502);
            assert_eq!(code, "HTTP502");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_spot_price_history_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("Action", "DescribeSpotPriceHistory"))
        .and(query_param("NetworkType", "vpc"))
        .and(query_param("InstanceType", "ecs.g6.large"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Currency": "USD",
            "SpotPrices": {"SpotPriceType": [
                {"ZoneId": "cn-hangzhou-h", "InstanceType": "ecs.g6.large", "SpotPrice": 0.1,
                 "OriginPrice": 0.5, "Timestamp": "2024-05-01T09:00:00Z"},
                {"ZoneId": "cn-hangzhou-h", "InstanceType": "ecs.g6.large", "SpotPrice": 0.12,
                 "OriginPrice": 0.5, "Timestamp": "2024-05-01T10:00:00Z"}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let samples = client(&server, static_store())
        .list_spot_price_history("ecs.g6.large")
        .await
        .unwrap();
    assert_eq!(samples.len(), 2);
    let latest = ecs_monitor_common::latest_per_zone(samples);
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].spot_price, 0.12);
}
