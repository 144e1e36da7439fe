use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use teamhub_core::entity::{find_by_id, find_by_id_mut};
use teamhub_core::{
    DeviceId, DomainError, DomainResult, Entity, PlanId, SubscriptionId, TeamId, ValueObject,
};

use crate::device::TeamDevice;

/// Plan terms, captured by value when the subscription is created so later
/// catalogue edits don't retroactively change an existing subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: PlanId,
    pub name: String,
    pub device_limit: u32,
    /// Price per billing period, in the smallest currency unit.
    pub price: u64,
}

impl ValueObject for SubscriptionPlan {}

/// Lifecycle status. Transitions only move forward in declaration order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
    Deactivated,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Deactivated => "deactivated",
        }
    }

    /// Trial or Active.
    pub fn is_live(self) -> bool {
        matches!(self, SubscriptionStatus::Trial | SubscriptionStatus::Active)
    }

    pub fn is_terminal(self) -> bool {
        self == SubscriptionStatus::Deactivated
    }
}

impl core::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A team's subscription with its device registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSubscription {
    id: SubscriptionId,
    team_id: TeamId,
    plan: SubscriptionPlan,
    status: SubscriptionStatus,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    trial_start_date: DateTime<Utc>,
    trial_end_date: DateTime<Utc>,
    last_payment_date: Option<DateTime<Utc>>,
    last_payment_amount: Option<u64>,
    discount_percent: u8,
    devices: Vec<TeamDevice>,
}

impl TeamSubscription {
    /// Start a subscription in `Trial`, running from `start` until `trial_end`.
    pub fn start_trial(
        team_id: TeamId,
        plan: SubscriptionPlan,
        start: DateTime<Utc>,
        trial_end: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if trial_end <= start {
            return Err(DomainError::validation("trial must end after it starts"));
        }
        if plan.name.trim().is_empty() {
            return Err(DomainError::validation("plan name cannot be empty"));
        }
        Ok(Self {
            id: SubscriptionId::new(),
            team_id,
            plan,
            status: SubscriptionStatus::Trial,
            start_date: start,
            end_date: None,
            trial_start_date: start,
            trial_end_date: trial_end,
            last_payment_date: None,
            last_payment_amount: None,
            discount_percent: 0,
            devices: Vec::new(),
        })
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    pub fn plan(&self) -> &SubscriptionPlan {
        &self.plan
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status
    }

    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    pub fn trial_start_date(&self) -> DateTime<Utc> {
        self.trial_start_date
    }

    pub fn trial_end_date(&self) -> DateTime<Utc> {
        self.trial_end_date
    }

    pub fn last_payment_date(&self) -> Option<DateTime<Utc>> {
        self.last_payment_date
    }

    pub fn last_payment_amount(&self) -> Option<u64> {
        self.last_payment_amount
    }

    pub fn discount_percent(&self) -> u8 {
        self.discount_percent
    }

    pub fn devices(&self) -> &[TeamDevice] {
        &self.devices
    }

    pub fn device(&self, id: DeviceId) -> Option<&TeamDevice> {
        find_by_id(&self.devices, id)
    }

    /// Instant after which a live subscription should be swept to `Expired`.
    /// `None` when open-ended or no longer live.
    pub fn computed_expiry(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SubscriptionStatus::Trial => Some(self.trial_end_date),
            SubscriptionStatus::Active => self.end_date,
            SubscriptionStatus::Expired | SubscriptionStatus::Deactivated => None,
        }
    }

    pub fn is_due_for_expiry(&self, now: DateTime<Utc>) -> bool {
        self.computed_expiry().is_some_and(|at| at <= now)
    }

    /// True only for a live, unexpired subscription with the device registered.
    pub fn authorizes_device(&self, unique_id: &str, now: DateTime<Utc>) -> bool {
        self.status.is_live()
            && !self.is_due_for_expiry(now)
            && self.devices.iter().any(|d| d.unique_id() == unique_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Devices
    // ─────────────────────────────────────────────────────────────────────

    pub fn add_device(
        &mut self,
        name: impl Into<String>,
        description: Option<String>,
        unique_id: impl Into<String>,
    ) -> DomainResult<DeviceId> {
        if !self.status.is_live() {
            return Err(self.inactive());
        }
        if self.devices.len() >= self.plan.device_limit as usize {
            return Err(DomainError::DeviceLimitExceeded {
                subscription_id: self.id,
                limit: self.plan.device_limit,
            });
        }
        let unique_id = unique_id.into();
        if let Some(existing) = self.devices.iter().find(|d| d.unique_id() == unique_id) {
            return Err(DomainError::DuplicateDevice {
                unique_id,
                existing: existing.id(),
            });
        }

        let device = TeamDevice::new(self.id, name.into(), description, unique_id)?;
        let id = device.id();
        self.devices.push(device);
        Ok(id)
    }

    /// Idempotent: `Ok(false)` when the device isn't registered.
    pub fn remove_device(&mut self, device_id: DeviceId) -> DomainResult<bool> {
        self.ensure_not_deactivated()?;
        let before = self.devices.len();
        self.devices.retain(|d| Entity::id(d) != device_id);
        Ok(self.devices.len() != before)
    }

    /// Display fields only.
    pub fn update_device(
        &mut self,
        device_id: DeviceId,
        name: impl Into<String>,
        description: Option<String>,
    ) -> DomainResult<()> {
        self.ensure_not_deactivated()?;
        let device = find_by_id_mut(&mut self.devices, device_id)
            .ok_or_else(|| DomainError::not_found(format!("device {device_id}")))?;
        device.rename(name.into(), description)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Billing & lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Record a payment. The first payment of a trial activates it.
    pub fn record_payment(&mut self, amount: u64, paid_at: DateTime<Utc>) -> DomainResult<()> {
        if amount == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if !self.status.is_live() {
            return Err(DomainError::InvalidTransition {
                from: self.status.as_str(),
                to: SubscriptionStatus::Active.as_str(),
            });
        }
        self.last_payment_date = Some(paid_at);
        self.last_payment_amount = Some(amount);
        if self.status == SubscriptionStatus::Trial {
            self.status = SubscriptionStatus::Active;
        }
        Ok(())
    }

    /// Set or clear the paid-through date. `None` means open-ended.
    pub fn set_end_date(&mut self, end_date: Option<DateTime<Utc>>) -> DomainResult<()> {
        if !self.status.is_live() {
            return Err(self.inactive());
        }
        if let Some(end) = end_date {
            if end <= self.start_date {
                return Err(DomainError::validation("end date must be after the start date"));
            }
        }
        self.end_date = end_date;
        Ok(())
    }

    pub fn set_discount(&mut self, percent: u8) -> DomainResult<()> {
        self.ensure_not_deactivated()?;
        if percent > 100 {
            return Err(DomainError::validation(format!(
                "discount must be between 0 and 100 (got {percent})"
            )));
        }
        self.discount_percent = percent;
        Ok(())
    }

    /// Move a live subscription whose computed expiry has passed to `Expired`.
    /// Returns whether a transition happened.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_due_for_expiry(now) {
            self.status = SubscriptionStatus::Expired;
            true
        } else {
            false
        }
    }

    /// Terminal. Devices are retained but no longer authorized. No-op when
    /// already deactivated.
    pub fn deactivate(&mut self) {
        self.status = SubscriptionStatus::Deactivated;
    }

    fn ensure_not_deactivated(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(self.inactive());
        }
        Ok(())
    }

    fn inactive(&self) -> DomainError {
        DomainError::SubscriptionInactive {
            subscription_id: self.id,
            status: self.status.as_str(),
        }
    }
}

impl Entity for TeamSubscription {
    type Id = SubscriptionId;

    fn id(&self) -> SubscriptionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn plan(limit: u32) -> SubscriptionPlan {
        SubscriptionPlan {
            id: PlanId::new(),
            name: "standard".to_string(),
            device_limit: limit,
            price: 1_999,
        }
    }

    fn trial(limit: u32) -> TeamSubscription {
        TeamSubscription::start_trial(TeamId::new(), plan(limit), t0(), t0() + Duration::days(14))
            .unwrap()
    }

    #[test]
    fn device_limit_is_enforced() {
        let mut s = trial(2);
        s.add_device("laptop", None, "uid-1").unwrap();
        s.add_device("tablet", None, "uid-2").unwrap();

        let err = s.add_device("phone", None, "uid-3").unwrap_err();
        assert!(matches!(err, DomainError::DeviceLimitExceeded { limit: 2, .. }));
        assert_eq!(s.devices().len(), 2);
    }

    #[test]
    fn full_subscription_reports_the_limit_even_for_known_uids() {
        let mut s = trial(2);
        s.add_device("laptop", None, "uid-1").unwrap();
        s.add_device("tablet", None, "uid-2").unwrap();

        let err = s.add_device("laptop again", None, "uid-1").unwrap_err();
        assert!(matches!(err, DomainError::DeviceLimitExceeded { limit: 2, .. }));
        assert_eq!(s.devices().len(), 2);
    }

    #[test]
    fn duplicate_unique_id_is_rejected() {
        let mut s = trial(5);
        let first = s.add_device("laptop", None, "uid-1").unwrap();
        let err = s.add_device("laptop again", None, "uid-1").unwrap_err();
        assert_eq!(
            err,
            DomainError::DuplicateDevice {
                unique_id: "uid-1".to_string(),
                existing: first
            }
        );
    }

    #[test]
    fn remove_device_is_idempotent() {
        let mut s = trial(1);
        let id = s.add_device("laptop", None, "uid-1").unwrap();
        assert!(s.remove_device(id).unwrap());
        assert!(!s.remove_device(id).unwrap());
    }

    #[test]
    fn update_device_changes_display_fields_only() {
        let mut s = trial(1);
        let id = s.add_device("laptop", None, "uid-1").unwrap();
        s.update_device(id, "work laptop", Some("3rd floor".into())).unwrap();
        let d = s.device(id).unwrap();
        assert_eq!(d.name(), "work laptop");
        assert_eq!(d.description(), Some("3rd floor"));
        assert_eq!(d.unique_id(), "uid-1");

        assert!(s.update_device(DeviceId::new(), "x", None).unwrap_err().is_not_found());
    }

    #[test]
    fn first_payment_activates_trial() {
        let mut s = trial(1);
        s.record_payment(1_999, t0() + Duration::days(3)).unwrap();
        assert_eq!(s.status(), SubscriptionStatus::Active);
        assert_eq!(s.last_payment_amount(), Some(1_999));
        assert_eq!(s.computed_expiry(), None);
    }

    #[test]
    fn zero_payment_is_rejected() {
        let mut s = trial(1);
        assert!(s.record_payment(0, t0()).is_err());
        assert_eq!(s.status(), SubscriptionStatus::Trial);
    }

    #[test]
    fn expired_subscription_rejects_devices_and_payments() {
        let mut s = trial(3);
        assert!(s.expire_if_due(t0() + Duration::days(14)));
        assert_eq!(s.status(), SubscriptionStatus::Expired);

        assert!(matches!(
            s.add_device("laptop", None, "uid-1"),
            Err(DomainError::SubscriptionInactive { .. })
        ));
        assert!(matches!(
            s.record_payment(100, t0()),
            Err(DomainError::InvalidTransition { from: "expired", to: "active" })
        ));
    }

    #[test]
    fn deactivated_subscription_keeps_devices_but_stops_authorizing_them() {
        let mut s = trial(2);
        let id = s.add_device("laptop", None, "uid-1").unwrap();
        assert!(s.authorizes_device("uid-1", t0() + Duration::days(1)));

        s.deactivate();
        s.deactivate();
        assert_eq!(s.status(), SubscriptionStatus::Deactivated);
        assert_eq!(s.devices().len(), 1);
        assert!(!s.authorizes_device("uid-1", t0() + Duration::days(1)));
        assert!(s.remove_device(id).is_err());
    }

    #[test]
    fn active_subscription_expires_at_end_date() {
        let mut s = trial(1);
        s.record_payment(500, t0()).unwrap();
        s.set_end_date(Some(t0() + Duration::days(30))).unwrap();

        assert!(!s.expire_if_due(t0() + Duration::days(29)));
        assert!(s.expire_if_due(t0() + Duration::days(30)));
        assert!(!s.expire_if_due(t0() + Duration::days(31)));
    }

    #[test]
    fn discount_is_a_percentage() {
        let mut s = trial(1);
        assert!(s.set_discount(101).is_err());
        s.set_discount(25).unwrap();
        assert_eq!(s.discount_percent(), 25);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Pay(u64),
        Expire(i64),
        Deactivate,
        AddDevice(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..1_000).prop_map(Op::Pay),
            (0i64..60).prop_map(Op::Expire),
            Just(Op::Deactivate),
            any::<u8>().prop_map(Op::AddDevice),
        ]
    }

    proptest! {
        #[test]
        fn status_never_moves_backwards(ops in proptest::collection::vec(op(), 0..40)) {
            let mut s = trial(4);
            let mut last = s.status();
            for op in ops {
                match op {
                    Op::Pay(amount) => { let _ = s.record_payment(amount, t0()); }
                    Op::Expire(days) => { s.expire_if_due(t0() + Duration::days(days)); }
                    Op::Deactivate => s.deactivate(),
                    Op::AddDevice(n) => { let _ = s.add_device("d", None, format!("uid-{n}")); }
                }
                prop_assert!(s.status() >= last);
                prop_assert!(s.devices().len() <= 4);
                last = s.status();
            }
        }
    }
}
