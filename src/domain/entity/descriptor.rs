//! Entity namespaces, endpoints and cache lifetimes

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::domain::DomainError;

/// How long a cached list of an entity stays fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlTier {
    /// Very volatile data
    Instant,
    /// Appointments, pending payments
    Short,
    Standard,
    /// Records that change rarely (owners, employees)
    Medium,
    Long,
    /// Near-static data (roles)
    VeryLong,
}

impl TtlTier {
    pub fn duration(self) -> Duration {
        match self {
            TtlTier::Instant => Duration::from_secs(30),
            TtlTier::Short => Duration::from_secs(60),
            TtlTier::Standard => Duration::from_secs(5 * 60),
            TtlTier::Medium => Duration::from_secs(10 * 60),
            TtlTier::Long => Duration::from_secs(30 * 60),
            TtlTier::VeryLong => Duration::from_secs(60 * 60),
        }
    }
}

/// Everything an entity client needs to know about its entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Cache namespace; every key of the entity starts with it
    pub namespace: String,
    /// Endpoint base path, without trailing slash
    pub path: String,
    pub ttl: Duration,
}

impl EntityDescriptor {
    pub fn new(namespace: impl Into<String>, path: impl Into<String>, ttl: Duration) -> Self {
        let path: String = path.into();

        Self {
            namespace: namespace.into(),
            path: path.trim_end_matches('/').to_string(),
            ttl,
        }
    }

    /// Endpoint of the paginated list
    pub fn list_path(&self) -> String {
        format!("{}/", self.path)
    }

    /// Endpoint of the simplified projection
    pub fn simple_path(&self) -> String {
        format!("{}/all/simple", self.path)
    }

    /// Endpoint of one record
    ///
    /// The id is percent-encoded into a single path segment; dot segments
    /// are refused since they would resolve to another endpoint.
    pub fn item_path(&self, id: &str) -> Result<String, DomainError> {
        let id = id.trim();
        if id.is_empty() || id == "." || id == ".." {
            return Err(DomainError::validation(format!(
                "Invalid {} id: '{}'",
                self.namespace, id
            )));
        }

        Ok(format!("{}/{}", self.path, urlencoding::encode(id)))
    }
}

/// Entities of the brokerage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Clients,
    Owners,
    Properties,
    Contracts,
    Payments,
    Employees,
    Users,
    Appointments,
    Roles,
    Addresses,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Clients,
        EntityKind::Owners,
        EntityKind::Properties,
        EntityKind::Contracts,
        EntityKind::Payments,
        EntityKind::Employees,
        EntityKind::Users,
        EntityKind::Appointments,
        EntityKind::Roles,
        EntityKind::Addresses,
    ];

    pub fn namespace(self) -> &'static str {
        match self {
            EntityKind::Clients => "clients",
            EntityKind::Owners => "owners",
            EntityKind::Properties => "properties",
            EntityKind::Contracts => "contracts",
            EntityKind::Payments => "payments",
            EntityKind::Employees => "employees",
            EntityKind::Users => "users",
            EntityKind::Appointments => "appointments",
            EntityKind::Roles => "roles",
            EntityKind::Addresses => "addresses",
        }
    }

    /// Backend endpoint
    pub fn path(self) -> &'static str {
        match self {
            EntityKind::Clients => "/clientes",
            EntityKind::Owners => "/propietarios",
            EntityKind::Properties => "/propiedades",
            EntityKind::Contracts => "/contratos",
            EntityKind::Payments => "/pagos",
            EntityKind::Employees => "/empleados",
            EntityKind::Users => "/usuarios",
            EntityKind::Appointments => "/citas-visita",
            EntityKind::Roles => "/roles",
            EntityKind::Addresses => "/direcciones",
        }
    }

    pub fn ttl_tier(self) -> TtlTier {
        match self {
            EntityKind::Appointments | EntityKind::Payments => TtlTier::Short,
            EntityKind::Contracts => TtlTier::Standard,
            EntityKind::Roles => TtlTier::VeryLong,
            EntityKind::Clients
            | EntityKind::Owners
            | EntityKind::Properties
            | EntityKind::Employees
            | EntityKind::Users
            | EntityKind::Addresses => TtlTier::Medium,
        }
    }

    pub fn descriptor(self) -> EntityDescriptor {
        EntityDescriptor::new(self.namespace(), self.path(), self.ttl_tier().duration())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

impl FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();

        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.namespace() == wanted)
            .ok_or_else(|| {
                let valid: Vec<&str> = EntityKind::ALL.iter().map(|k| k.namespace()).collect();
                DomainError::validation(format!(
                    "Unknown entity: {}. Valid entities: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}
