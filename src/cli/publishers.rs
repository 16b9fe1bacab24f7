use anyhow::Result;

use crate::{
    api::{NewPublisher, Registry, Transport},
    PublishersCmd,
};

use super::echo;

pub fn handle_publishers<T: Transport>(cmd: PublishersCmd, registry: &Registry<T>) -> Result<()> {
    match cmd {
        PublishersCmd::Create {
            name,
            email,
            website_url,
            level,
        } => {
            let publisher = NewPublisher {
                name,
                email,
                website_url,
                level,
            };
            let created = registry.create_publisher(&publisher)?;
            echo("Publisher created successfully:", &created)
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::{json, Value};

    use super::*;
    use crate::api::mock::*;

    fn create_cmd() -> PublishersCmd {
        PublishersCmd::Create {
            name: "Acme".into(),
            email: "ops@acme.test".into(),
            website_url: "https://acme.test".into(),
            level: "internal".into(),
        }
    }

    #[test]
    fn create_posts_publisher_with_basic_auth() {
        let transport = MockTransport::new().respond_json(201, json!({"data": {"id": 3}}));
        let registry = registry(all_credentials(), transport);

        handle_publishers(create_cmd(), &registry).unwrap();

        let requests = registry.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].url.path(), "/app-registry/api/publishers/");
        assert!(requests[0]
            .header("Authorization")
            .unwrap()
            .starts_with("Basic "));
        let body: Value = serde_json::from_slice(requests[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({"publisher": {
                "name": "Acme",
                "email": "ops@acme.test",
                "website_url": "https://acme.test",
                "level": "internal"
            }})
        );
    }

    #[test]
    fn create_without_basic_auth_fails() {
        let registry = registry(token_only(), MockTransport::new());

        let err = handle_publishers(create_cmd(), &registry).unwrap_err();
        assert!(err.to_string().contains("ADMIN_BASIC_AUTH_PASSWORD"));
        assert!(registry.transport().requests().is_empty());
    }
}
