use gatekeeper::object::{Permission, Record, Role, Webhook};

/// Builder for test permissions under the `org` owner
pub struct PermissionBuilder {
    permission: Permission,
}

impl PermissionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            permission: Permission {
                owner: "org".to_string(),
                name: name.to_string(),
                effect: "Allow".to_string(),
                is_enabled: true,
                ..Default::default()
            },
        }
    }

    pub fn user(mut self, user: &str) -> Self {
        self.permission.users.push(user.to_string());
        self
    }

    pub fn role(mut self, role: &str) -> Self {
        self.permission.roles.push(role.to_string());
        self
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.permission.domains.push(domain.to_string());
        self
    }

    pub fn resource(mut self, resource: &str) -> Self {
        self.permission.resources.push(resource.to_string());
        self
    }

    pub fn action(mut self, action: &str) -> Self {
        self.permission.actions.push(action.to_string());
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.permission.model = model.to_string();
        self
    }

    pub fn adapter(mut self, adapter: &str) -> Self {
        self.permission.adapter = adapter.to_string();
        self
    }

    pub fn effect(mut self, effect: &str) -> Self {
        self.permission.effect = effect.to_string();
        self
    }

    pub fn build(self) -> Permission {
        self.permission
    }
}

/// Builder for test roles under the `org` owner
pub struct RoleBuilder {
    role: Role,
}

impl RoleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            role: Role {
                owner: "org".to_string(),
                name: name.to_string(),
                is_enabled: true,
                ..Default::default()
            },
        }
    }

    pub fn user(mut self, user: &str) -> Self {
        self.role.users.push(user.to_string());
        self
    }

    pub fn nested(mut self, role: &str) -> Self {
        self.role.roles.push(role.to_string());
        self
    }

    pub fn build(self) -> Role {
        self.role
    }
}

/// Builder for enabled test webhooks subscribed to `login`
pub struct WebhookBuilder {
    webhook: Webhook,
}

impl WebhookBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            webhook: Webhook {
                owner: "admin".to_string(),
                name: name.to_string(),
                organization: "org".to_string(),
                url: "http://localhost:9/hook".to_string(),
                method: "POST".to_string(),
                events: vec!["login".to_string()],
                is_enabled: true,
                max_retries: 3,
                retry_interval: 60,
                ..Default::default()
            },
        }
    }

    pub fn disabled(mut self) -> Self {
        self.webhook.is_enabled = false;
        self
    }

    pub fn max_retries(mut self, max_retries: i32) -> Self {
        self.webhook.max_retries = max_retries;
        self
    }

    pub fn exponential(mut self) -> Self {
        self.webhook.use_exponential_backoff = true;
        self
    }

    pub fn user_extended(mut self) -> Self {
        self.webhook.is_user_extended = true;
        self
    }

    pub fn build(self) -> Webhook {
        self.webhook
    }
}

pub fn login_record(organization: &str) -> Record {
    Record {
        owner: organization.to_string(),
        name: "record-1".to_string(),
        organization: organization.to_string(),
        user: "alice".to_string(),
        method: "POST".to_string(),
        request_uri: "/api/login".to_string(),
        action: "login".to_string(),
        status_code: 200,
        ..Default::default()
    }
}
