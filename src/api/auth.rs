//! Request authentication and authorization.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// The three externally callable operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiAction {
    ViewDashboard,
    SeedData,
    MigrateOrders,
}

impl ApiAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiAction::ViewDashboard => "view_dashboard",
            ApiAction::SeedData => "seed_data",
            ApiAction::MigrateOrders => "migrate_orders",
        }
    }

    /// Permission required to perform the action.
    pub fn capability(self) -> Capability {
        match self {
            ApiAction::ViewDashboard | ApiAction::MigrateOrders => Capability::ManageStore,
            ApiAction::SeedData => Capability::ManageSettings,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Store managers: dashboards and backfill.
    ManageStore,
    /// Site administrators: demo data.
    ManageSettings,
}

/// Who is calling, and with which anti-forgery token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub user: Option<String>,
    pub token: Option<String>,
}

impl RequestContext {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Token and permission checks, delegated to the hosting platform.
pub trait Gatekeeper: Send + Sync {
    /// Whether `ctx` carries a valid anti-forgery token for `action`.
    fn verify_token(&self, ctx: &RequestContext, action: ApiAction) -> bool;

    fn authorize(&self, ctx: &RequestContext, capability: Capability) -> bool;
}

/// In-memory grants and tokens.
#[derive(Default)]
pub struct StaticGatekeeper {
    grants: RwLock<HashMap<String, HashSet<Capability>>>,
    tokens: RwLock<HashMap<String, HashSet<ApiAction>>>,
}

impl StaticGatekeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, user: impl Into<String>, capability: Capability) {
        self.grants
            .write()
            .entry(user.into())
            .or_default()
            .insert(capability);
    }

    pub fn issue_token(&self, token: impl Into<String>, action: ApiAction) {
        self.tokens
            .write()
            .entry(token.into())
            .or_default()
            .insert(action);
    }

    pub fn revoke_token(&self, token: &str) {
        self.tokens.write().remove(token);
    }
}

impl Gatekeeper for StaticGatekeeper {
    fn verify_token(&self, ctx: &RequestContext, action: ApiAction) -> bool {
        ctx.token.as_deref().is_some_and(|token| {
            self.tokens
                .read()
                .get(token)
                .is_some_and(|actions| actions.contains(&action))
        })
    }

    fn authorize(&self, ctx: &RequestContext, capability: Capability) -> bool {
        ctx.user.as_deref().is_some_and(|user| {
            self.grants
                .read()
                .get(user)
                .is_some_and(|caps| caps.contains(&capability))
        })
    }
}
