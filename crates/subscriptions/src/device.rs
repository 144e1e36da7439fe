use serde::{Deserialize, Serialize};

use teamhub_core::{DeviceId, DomainError, DomainResult, Entity, SubscriptionId};

/// A client device registered under a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamDevice {
    id: DeviceId,
    subscription_id: SubscriptionId,
    name: String,
    description: Option<String>,
    /// Hardware/client identifier, unique within the subscription.
    unique_id: String,
}

impl TeamDevice {
    pub(crate) fn new(
        subscription_id: SubscriptionId,
        name: String,
        description: Option<String>,
        unique_id: String,
    ) -> DomainResult<Self> {
        ensure_non_empty("device name", &name)?;
        ensure_non_empty("device unique id", &unique_id)?;
        Ok(Self {
            id: DeviceId::new(),
            subscription_id,
            name,
            description,
            unique_id,
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub(crate) fn rename(&mut self, name: String, description: Option<String>) -> DomainResult<()> {
        ensure_non_empty("device name", &name)?;
        self.name = name;
        self.description = description;
        Ok(())
    }
}

impl Entity for TeamDevice {
    type Id = DeviceId;

    fn id(&self) -> DeviceId {
        self.id
    }
}

fn ensure_non_empty(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}
