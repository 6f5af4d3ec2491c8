//! Sign-in, token relay and sign-out through the application context.

use livedoc::memory::{
    MemoryAuthBackend, MemoryDocumentStore, RecordingApiClient, RecordingNavigator,
};
use livedoc::{AuthBackend, Identity, LinkConfig, LinkContext, Provider, Uid};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

struct Harness {
    ctx: LinkContext,
    auth: MemoryAuthBackend,
    api: RecordingApiClient,
    nav: RecordingNavigator,
}

fn harness(config: LinkConfig) -> Harness {
    let mut auth = MemoryAuthBackend::new();
    for provider in Provider::ALL {
        auth = auth.with_provider_identity(
            provider,
            Identity::new(format!("{}-user", provider)).with_display_name("Federated"),
        );
    }
    let api = RecordingApiClient::new();
    let nav = RecordingNavigator::new();

    let ctx = LinkContext::builder()
        .config(config)
        .auth(Arc::new(auth.clone()))
        .store(Arc::new(MemoryDocumentStore::new()))
        .api(Arc::new(api.clone()))
        .navigator(Arc::new(nav.clone()))
        .start()
        .unwrap();

    Harness { ctx, auth, api, nav }
}

#[test]
fn test_federated_providers() {
    let h = harness(LinkConfig::default());

    for provider in Provider::ALL {
        let identity = h.ctx.sign_in_with_provider(provider).unwrap();
        assert_eq!(identity.uid, Uid::new(format!("{}-user", provider)));
        assert_eq!(h.ctx.user(), Some(identity));
    }
}

#[test]
fn test_sign_up_then_token_relayed() {
    let h = harness(LinkConfig::default());

    let identity = h
        .ctx
        .sign_up_with_email_and_password("new@example.com", "correct horse")
        .unwrap();
    assert_eq!(h.ctx.user().map(|u| u.uid), Some(identity.uid.clone()));

    let prefix = format!("tok-{}-", identity.uid);
    assert!(wait_until(|| {
        h.api
            .bearer_token()
            .map_or(false, |token| token.as_str().starts_with(&prefix))
    }));
}

#[test]
fn test_silent_refresh_updates_header() {
    let h = harness(LinkConfig::default());
    h.ctx.sign_in_with_provider(Provider::Apple).unwrap();
    assert!(wait_until(|| h.api.bearer_token().is_some()));
    let first = h.api.bearer_token();

    assert!(h.auth.refresh_token());
    assert!(wait_until(|| {
        let current = h.api.bearer_token();
        current.is_some() && current != first
    }));
    assert!(h.api.bearer_history().len() >= 2);
}

#[test]
fn test_sign_out_clears_identity_header_and_navigates() {
    let h = harness(LinkConfig {
        landing_route: "/welcome".to_string(),
        ..Default::default()
    });
    h.ctx.sign_in_with_provider(Provider::Google).unwrap();
    assert!(wait_until(|| h.api.bearer_token().is_some()));

    h.ctx.sign_out().unwrap();
    assert!(h.ctx.user().is_none());
    assert_eq!(h.nav.routes(), vec!["/welcome".to_string()]);
    assert!(wait_until(|| h.api.bearer_token().is_none()));
}

#[test]
fn test_sign_in_outside_context_is_observed() {
    let h = harness(LinkConfig::default());
    let watch = h.ctx.session().watch();

    h.auth.sign_in_with_provider(Provider::Microsoft).unwrap();
    let change = watch.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(change.map(|i| i.uid), Some(Uid::new("microsoft-user")));
    assert!(h.ctx.user().is_some());
}

#[test]
fn test_invalidate_balance_related_queries() {
    let h = harness(LinkConfig::default());

    let report = h.ctx.invalidate_balance_related_queries();
    assert!(report.all_succeeded());
    assert_eq!(report.outcomes.len(), 2);

    let mut keys = h.api.invalidations();
    keys.sort();
    assert_eq!(keys, vec!["balance", "transactions"]);
}
