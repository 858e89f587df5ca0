//! Admission controller
//!
//! Given a channel, either returns its already-active lease or walks
//! the catalog's ordered candidates and reserves the first admissible
//! (stream, profile) pair against the shared lease store. Greedy
//! first-fit: no load balancing, no least-loaded selection.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::metrics;
use crate::models::{ChannelId, LeaseGrant, Profile, ProfileId, StreamRef};
use crate::store::LeaseStore;
use crate::{Error, Result};

pub struct AdmissionController {
    store: Arc<dyn LeaseStore>,
    catalog: Arc<dyn Catalog>,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn LeaseStore>, catalog: Arc<dyn Catalog>) -> Self {
        Self { store, catalog }
    }

    /// Admit a viewer to a channel.
    ///
    /// Returns the existing lease unchanged when the channel is
    /// already assigned: one upstream connection serves every viewer
    /// of the channel, and the counter is not incremented again.
    /// Otherwise reserves the first admissible candidate, or fails
    /// with `Error::NoCapacity` leaving no partial state behind.
    pub async fn acquire(&self, channel_id: ChannelId) -> Result<LeaseGrant> {
        // Fast path: the channel is already playing.
        if let Some(stream) = self.store.channel_stream(channel_id).await? {
            if let Some(profile_id) = self.store.stream_profile(stream.id).await? {
                self.store.touch_lease(channel_id).await?;
                metrics::ACQUIRES_TOTAL.with_label_values(&["reused"]).inc();
                tracing::debug!(
                    channel_id = %channel_id,
                    stream_id = %stream.id,
                    profile_id = %profile_id,
                    "Reusing active lease"
                );
                return Ok(LeaseGrant { stream, profile_id });
            }
        }

        for candidate in self.catalog.candidates(channel_id).await? {
            for profile in ordered_profiles(&candidate.profiles) {
                let limited = profile.max_connections > 0;
                if limited
                    && !self
                        .store
                        .try_reserve_slot(profile.id, profile.max_connections)
                        .await?
                {
                    continue;
                }

                let stream = candidate.stream.to_ref();
                self.write_reservation(channel_id, &stream, profile.id, limited)
                    .await?;

                metrics::ACQUIRES_TOTAL
                    .with_label_values(&["assigned"])
                    .inc();
                tracing::info!(
                    channel_id = %channel_id,
                    stream_id = %stream.id,
                    account_id = %candidate.stream.account_id,
                    profile_id = %profile.id,
                    "Lease assigned"
                );
                return Ok(LeaseGrant {
                    stream,
                    profile_id: profile.id,
                });
            }
        }

        metrics::ACQUIRES_TOTAL
            .with_label_values(&["no_capacity"])
            .inc();
        tracing::warn!(channel_id = %channel_id, "No admissible stream/profile");
        Err(Error::NoCapacity(channel_id))
    }

    /// Refresh the lease heartbeat for a playing channel. Returns
    /// whether a lease existed. The transport layer calls this
    /// periodically so the reaper leaves live sessions alone.
    pub async fn renew(&self, channel_id: ChannelId) -> Result<bool> {
        self.store.touch_lease(channel_id).await
    }

    /// Read-only capacity introspection.
    pub async fn connection_count(&self, profile_id: ProfileId) -> Result<u32> {
        self.store.connection_count(profile_id).await
    }

    /// The association is written before the lease, so any visible
    /// lease has a resolvable profile. A reserved slot whose follow-up
    /// writes fail is handed back before the error propagates.
    async fn write_reservation(
        &self,
        channel_id: ChannelId,
        stream: &StreamRef,
        profile_id: ProfileId,
        limited: bool,
    ) -> Result<()> {
        let writes = async {
            self.store.set_stream_profile(stream.id, profile_id).await?;
            self.store.set_channel_stream(channel_id, stream).await
        };

        if let Err(err) = writes.await {
            if limited {
                if let Err(release_err) = self.store.release_slot(profile_id).await {
                    tracing::warn!(
                        profile_id = %profile_id,
                        error = %release_err,
                        "Failed to hand back reserved slot after write failure"
                    );
                }
            }
            return Err(err);
        }
        Ok(())
    }
}

/// Default profile first (when present and active), then the remaining
/// active non-default profiles in source order. Inactive profiles are
/// never visited.
fn ordered_profiles(profiles: &[Profile]) -> Vec<&Profile> {
    let mut ordered = Vec::with_capacity(profiles.len());
    if let Some(default) = profiles.iter().find(|p| p.is_default) {
        if default.active {
            ordered.push(default);
        }
    }
    ordered.extend(profiles.iter().filter(|p| p.active && !p.is_default));
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::models::{AccountId, Candidate, Stream, StreamId};
    use crate::service::ReleaseHandler;
    use crate::store::MemoryLeaseStore;

    fn profile(id: u64, active: bool, is_default: bool, max_connections: u32) -> Profile {
        Profile {
            id: ProfileId(id),
            active,
            is_default,
            max_connections,
        }
    }

    fn candidate(stream_id: u64, account_id: u64, profiles: Vec<Profile>) -> Candidate {
        Candidate {
            stream: Stream {
                id: StreamId(stream_id),
                url: format!("http://upstream.example/{stream_id}"),
                account_id: AccountId(account_id),
            },
            profiles,
        }
    }

    fn controller(catalog: StaticCatalog) -> (AdmissionController, Arc<MemoryLeaseStore>) {
        let store = Arc::new(MemoryLeaseStore::new());
        let admission = AdmissionController::new(store.clone(), Arc::new(catalog));
        (admission, store)
    }

    #[test]
    fn test_ordered_profiles_default_first() {
        let profiles = vec![
            profile(1, true, false, 5),
            profile(2, true, true, 5),
            profile(3, true, false, 5),
        ];
        let order: Vec<u64> = ordered_profiles(&profiles).iter().map(|p| p.id.0).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn test_ordered_profiles_skips_inactive_default() {
        let profiles = vec![profile(1, false, true, 5), profile(2, true, false, 5)];
        let order: Vec<u64> = ordered_profiles(&profiles).iter().map(|p| p.id.0).collect();
        assert_eq!(order, vec![2]);
    }

    #[tokio::test]
    async fn test_first_stream_in_order_wins() {
        let catalog = StaticCatalog::new().with_channel(
            ChannelId(1),
            vec![
                candidate(10, 1, vec![profile(100, true, false, 0)]),
                candidate(20, 1, vec![profile(100, true, false, 0)]),
            ],
        );
        let (admission, _) = controller(catalog);

        let grant = admission.acquire(ChannelId(1)).await.unwrap();
        assert_eq!(grant.stream.id, StreamId(10));
        assert_eq!(grant.stream.url, "http://upstream.example/10");
    }

    #[tokio::test]
    async fn test_default_profile_preferred() {
        let catalog = StaticCatalog::new().with_channel(
            ChannelId(1),
            vec![candidate(
                10,
                1,
                vec![profile(100, true, false, 5), profile(200, true, true, 5)],
            )],
        );
        let (admission, _) = controller(catalog);

        let grant = admission.acquire(ChannelId(1)).await.unwrap();
        assert_eq!(grant.profile_id, ProfileId(200));
    }

    #[tokio::test]
    async fn test_inactive_profile_never_selected() {
        let catalog = StaticCatalog::new().with_channel(
            ChannelId(1),
            vec![candidate(10, 1, vec![profile(100, false, true, 5)])],
        );
        let (admission, _) = controller(catalog);

        let err = admission.acquire(ChannelId(1)).await.unwrap_err();
        assert!(err.is_no_capacity());
    }

    #[tokio::test]
    async fn test_unlimited_profile_does_not_count() {
        let catalog = StaticCatalog::new().with_channel(
            ChannelId(1),
            vec![candidate(10, 1, vec![profile(100, true, false, 0)])],
        );
        let (admission, store) = controller(catalog);

        admission.acquire(ChannelId(1)).await.unwrap();
        assert_eq!(store.connection_count(ProfileId(100)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_repeat_acquire_returns_same_pair_without_counting() {
        let catalog = StaticCatalog::new().with_channel(
            ChannelId(1),
            vec![candidate(10, 1, vec![profile(100, true, false, 3)])],
        );
        let (admission, store) = controller(catalog);

        let first = admission.acquire(ChannelId(1)).await.unwrap();
        let second = admission.acquire(ChannelId(1)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.connection_count(ProfileId(100)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_then_release_frees_slot() {
        // Two channels backed by different streams of the same
        // account, sharing one single-slot profile.
        let shared = vec![profile(100, true, false, 1)];
        let catalog = StaticCatalog::new()
            .with_channel(ChannelId(1), vec![candidate(10, 1, shared.clone())])
            .with_channel(ChannelId(2), vec![candidate(20, 1, shared)]);
        let (admission, store) = controller(catalog);
        let release = ReleaseHandler::new(store.clone());

        let grant = admission.acquire(ChannelId(1)).await.unwrap();
        assert_eq!(grant.profile_id, ProfileId(100));

        let err = admission.acquire(ChannelId(2)).await.unwrap_err();
        assert!(err.is_no_capacity());

        release.release(ChannelId(1)).await.unwrap();

        let grant = admission.acquire(ChannelId(2)).await.unwrap();
        assert_eq!(grant.stream.id, StreamId(20));
        assert_eq!(store.connection_count(ProfileId(100)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_saturated_first_stream_falls_through_to_second() {
        let catalog = StaticCatalog::new()
            .with_channel(ChannelId(1), vec![candidate(10, 1, vec![profile(100, true, false, 1)])])
            .with_channel(
                ChannelId(2),
                vec![
                    candidate(10, 1, vec![profile(100, true, false, 1)]),
                    candidate(20, 2, vec![profile(200, true, false, 1)]),
                ],
            );
        let (admission, _) = controller(catalog);

        admission.acquire(ChannelId(1)).await.unwrap();

        let grant = admission.acquire(ChannelId(2)).await.unwrap();
        assert_eq!(grant.stream.id, StreamId(20));
        assert_eq!(grant.profile_id, ProfileId(200));
    }

    #[tokio::test]
    async fn test_no_capacity_leaves_no_state() {
        let catalog = StaticCatalog::new().with_channel(
            ChannelId(1),
            vec![candidate(10, 1, vec![profile(100, false, false, 5)])],
        );
        let (admission, store) = controller(catalog);

        assert!(admission.acquire(ChannelId(1)).await.is_err());

        assert!(store.channel_stream(ChannelId(1)).await.unwrap().is_none());
        assert!(store.stream_profile(StreamId(10)).await.unwrap().is_none());
        assert_eq!(store.connection_count(ProfileId(100)).await.unwrap(), 0);
        assert!(store.active_channels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_account_without_profiles_is_tolerated() {
        let catalog = StaticCatalog::new()
            .with_channel(ChannelId(1), vec![candidate(10, 1, Vec::new())]);
        let (admission, _) = controller(catalog);

        let err = admission.acquire(ChannelId(1)).await.unwrap_err();
        assert!(err.is_no_capacity());
    }

    #[tokio::test]
    async fn test_unknown_channel_is_no_capacity() {
        let (admission, _) = controller(StaticCatalog::new());
        let err = admission.acquire(ChannelId(404)).await.unwrap_err();
        assert!(err.is_no_capacity());
    }

    #[tokio::test]
    async fn test_renew_refreshes_only_existing_leases() {
        let catalog = StaticCatalog::new().with_channel(
            ChannelId(1),
            vec![candidate(10, 1, vec![profile(100, true, false, 1)])],
        );
        let (admission, store) = controller(catalog);

        assert!(!admission.renew(ChannelId(1)).await.unwrap());

        admission.acquire(ChannelId(1)).await.unwrap();
        store.set_heartbeat(ChannelId(1), 0);
        assert!(admission.renew(ChannelId(1)).await.unwrap());
        let heartbeat = store.lease_heartbeat(ChannelId(1)).await.unwrap().unwrap();
        assert!(heartbeat > 0);
    }

    #[tokio::test]
    async fn test_capacity_invariant_under_concurrent_acquires() {
        // 16 distinct channels race for the same 3-slot profile; each
        // channel has its own backing stream so none of them hit the
        // fast path.
        let cap = 3u32;
        let channels = 16u64;

        let mut catalog = StaticCatalog::new();
        for ch in 0..channels {
            catalog.insert(
                ChannelId(ch),
                vec![candidate(ch, 1, vec![profile(100, true, false, cap)])],
            );
        }
        let (admission, store) = controller(catalog);
        let admission = Arc::new(admission);

        let mut tasks = tokio::task::JoinSet::new();
        for ch in 0..channels {
            let admission = admission.clone();
            tasks.spawn(async move { admission.acquire(ChannelId(ch)).await });
        }

        let mut admitted = 0;
        let mut rejected = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => admitted += 1,
                Err(err) => {
                    assert!(err.is_no_capacity());
                    rejected += 1;
                }
            }
        }

        assert_eq!(admitted, cap as usize);
        assert_eq!(rejected, channels as usize - cap as usize);
        assert_eq!(store.connection_count(ProfileId(100)).await.unwrap(), cap);
    }

    #[tokio::test]
    async fn test_unlimited_profile_never_exhausts_under_load() {
        let channels = 32u64;
        let mut catalog = StaticCatalog::new();
        for ch in 0..channels {
            catalog.insert(
                ChannelId(ch),
                vec![candidate(ch, 1, vec![profile(100, true, false, 0)])],
            );
        }
        let (admission, store) = controller(catalog);
        let admission = Arc::new(admission);

        let mut tasks = tokio::task::JoinSet::new();
        for ch in 0..channels {
            let admission = admission.clone();
            tasks.spawn(async move { admission.acquire(ChannelId(ch)).await });
        }
        while let Some(result) = tasks.join_next().await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(store.connection_count(ProfileId(100)).await.unwrap(), 0);
    }

    mod write_failure {
        use super::*;
        use crate::models::StreamRef;
        use crate::store::LeaseStore;
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicBool, Ordering};

        /// Delegates to the in-memory store but fails the lease write,
        /// simulating a store outage mid-reservation.
        struct FailingLeaseWrite {
            inner: MemoryLeaseStore,
            fail_lease_write: AtomicBool,
        }

        impl FailingLeaseWrite {
            fn new() -> Self {
                Self {
                    inner: MemoryLeaseStore::new(),
                    fail_lease_write: AtomicBool::new(true),
                }
            }
        }

        #[async_trait]
        impl LeaseStore for FailingLeaseWrite {
            async fn channel_stream(&self, channel_id: ChannelId) -> Result<Option<StreamRef>> {
                self.inner.channel_stream(channel_id).await
            }
            async fn set_channel_stream(
                &self,
                channel_id: ChannelId,
                stream: &StreamRef,
            ) -> Result<()> {
                if self.fail_lease_write.swap(false, Ordering::SeqCst) {
                    return Err(Error::Internal("injected write failure".to_string()));
                }
                self.inner.set_channel_stream(channel_id, stream).await
            }
            async fn delete_channel_stream(&self, channel_id: ChannelId) -> Result<()> {
                self.inner.delete_channel_stream(channel_id).await
            }
            async fn stream_profile(&self, stream_id: StreamId) -> Result<Option<ProfileId>> {
                self.inner.stream_profile(stream_id).await
            }
            async fn set_stream_profile(
                &self,
                stream_id: StreamId,
                profile_id: ProfileId,
            ) -> Result<()> {
                self.inner.set_stream_profile(stream_id, profile_id).await
            }
            async fn delete_stream_profile(&self, stream_id: StreamId) -> Result<()> {
                self.inner.delete_stream_profile(stream_id).await
            }
            async fn connection_count(&self, profile_id: ProfileId) -> Result<u32> {
                self.inner.connection_count(profile_id).await
            }
            async fn try_reserve_slot(
                &self,
                profile_id: ProfileId,
                max_connections: u32,
            ) -> Result<bool> {
                self.inner.try_reserve_slot(profile_id, max_connections).await
            }
            async fn release_slot(&self, profile_id: ProfileId) -> Result<()> {
                self.inner.release_slot(profile_id).await
            }
            async fn touch_lease(&self, channel_id: ChannelId) -> Result<bool> {
                self.inner.touch_lease(channel_id).await
            }
            async fn lease_heartbeat(&self, channel_id: ChannelId) -> Result<Option<u64>> {
                self.inner.lease_heartbeat(channel_id).await
            }
            async fn active_channels(&self) -> Result<Vec<ChannelId>> {
                self.inner.active_channels().await
            }
        }

        #[tokio::test]
        async fn test_failed_lease_write_hands_slot_back() {
            let catalog = StaticCatalog::new().with_channel(
                ChannelId(1),
                vec![candidate(10, 1, vec![profile(100, true, false, 1)])],
            );
            let store = Arc::new(FailingLeaseWrite::new());
            let admission = AdmissionController::new(store.clone(), Arc::new(catalog));

            let err = admission.acquire(ChannelId(1)).await.unwrap_err();
            assert!(matches!(err, Error::Internal(_)));
            assert_eq!(store.connection_count(ProfileId(100)).await.unwrap(), 0);

            // The store recovered; the next acquire succeeds.
            let grant = admission.acquire(ChannelId(1)).await.unwrap();
            assert_eq!(grant.profile_id, ProfileId(100));
            assert_eq!(store.connection_count(ProfileId(100)).await.unwrap(), 1);
        }
    }
}
