//! Integration tests for tokensdk-network.
//!
//! Every test drives the adapter against the in-memory ledger platform.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokensdk_network::{
    Identity, IdentityScheme, NativeValidationCode, Network, NetworkConfig, NetworkError,
    PlatformError, TokenId, TransientMap, TxId, TxStatusChangeListener, UnspentToken,
    ValidationCode,
};
use tokensdk_network::driver::RwSet;
use tokensdk_network::invocation::{INVOKE_FUNCTION, QUERY_TOKENS_FUNCTION, TOKEN_REQUEST_KEY};
use tokensdk_test_fixtures::membership::{DEFAULT_IDENTITY, EID_SUFFIX};
use tokensdk_test_fixtures::{
    audit_info_for, init_tracing, settle, tx_id_digest, CountingTokenVaultFactory, InMemoryLedger,
    JsonRwSet, RecordingListener, NONCE_LEN, TEST_CHANNEL, TEST_NAMESPACE, TEST_NETWORK,
};
use tokio_util::sync::CancellationToken;

// === Test Fixtures ===

fn setup() -> (Arc<InMemoryLedger>, Network) {
    init_tracing();
    let ledger = Arc::new(InMemoryLedger::new());
    let network = ledger.network();
    (ledger, network)
}

fn sample_token(tx_id: &str, owner: &str, token_type: &str) -> UnspentToken {
    UnspentToken {
        id: TokenId::new(tx_id, 0),
        owner: Identity(owner.as_bytes().to_vec()),
        token_type: token_type.to_string(),
        quantity: "0x0a".to_string(),
    }
}

// === Configuration ===

#[tokio::test]
async fn test_network_exposes_names() {
    let (_ledger, network) = setup();
    assert_eq!(network.name(), TEST_NETWORK);
    assert_eq!(network.channel(), TEST_CHANNEL);
}

#[tokio::test]
async fn test_network_rejects_blank_channel() {
    let ledger = Arc::new(InMemoryLedger::new());
    let result = Network::new(NetworkConfig::new(TEST_NETWORK, ""), ledger.connection());
    assert!(matches!(result, Err(NetworkError::InvalidConfig(_))));
}

// === Vault Cache ===

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_vault_built_once_under_concurrency() {
    let (ledger, network) = setup();
    let network = Arc::new(network);

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let network = Arc::clone(&network);
            tokio::spawn(async move { network.vault(TEST_NAMESPACE).await })
        })
        .collect();

    let mut vaults = Vec::new();
    for handle in handles {
        vaults.push(handle.await.unwrap());
    }

    for vault in &vaults {
        assert!(Arc::ptr_eq(&vaults[0], vault));
    }
    assert_eq!(ledger.token_vaults().built(), 1);
    assert_eq!(network.vault_cache().len().await, 1);
}

#[tokio::test]
async fn test_vault_per_namespace() {
    let (ledger, network) = setup();
    assert!(network.vault_cache().is_empty().await);

    let a = network.vault("ns-a").await;
    let b = network.vault("ns-b").await;
    let a_again = network.vault("ns-a").await;

    assert_eq!(a.namespace(), "ns-a");
    assert_eq!(b.namespace(), "ns-b");
    assert!(Arc::ptr_eq(&a, &a_again));
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(ledger.token_vaults().built(), 2);

    let built = ledger.token_vaults().built_for("ns-a");
    assert_eq!(built.len(), 1);
    assert_eq!(built[0].channel, TEST_CHANNEL);
}

#[tokio::test]
async fn test_vault_token_operations() {
    init_tracing();
    let factory = CountingTokenVaultFactory::with_tokens(vec![
        sample_token("tx1", "alice", "USD"),
        sample_token("tx2", "bob", "USD"),
        sample_token("tx3", "alice", "EUR"),
    ]);
    let ledger = Arc::new(InMemoryLedger::new().with_token_vaults(factory));
    let vault = ledger.network().vault(TEST_NAMESPACE).await;

    assert_eq!(vault.list_unspent_tokens().unwrap().len(), 3);
    assert_eq!(vault.unspent_tokens_iterator().unwrap().count(), 3);

    let alice_usd: Vec<UnspentToken> = vault
        .unspent_tokens_iterator_by("alice", "USD")
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(alice_usd, vec![sample_token("tx1", "alice", "USD")]);

    let id = TokenId::new("tx1", 0);
    assert!(!vault.certification_exists(&id));
    vault
        .store_certifications(HashMap::from([(id.clone(), b"cert".to_vec())]))
        .unwrap();
    assert!(vault.certification_exists(&id));
}

#[tokio::test]
async fn test_vault_status_and_discard() {
    let (ledger, network) = setup();
    let vault = network.vault(TEST_NAMESPACE).await;

    ledger.commit("tx-valid", NativeValidationCode::VALID, &JsonRwSet::new());
    ledger.mark_busy("tx-busy");

    assert_eq!(vault.status("tx-valid").await.unwrap(), ValidationCode::Valid);
    assert_eq!(vault.status("tx-busy").await.unwrap(), ValidationCode::Unknown);
    assert_eq!(vault.status("tx-none").await.unwrap(), ValidationCode::Unknown);
    assert_eq!(vault.last_tx_id().await.unwrap(), "tx-valid");

    vault.discard_tx("tx-busy").await.unwrap();
    assert_eq!(vault.status("tx-busy").await.unwrap(), ValidationCode::Invalid);

    let err = vault.discard_tx("tx-valid").await.unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Platform { source: PlatformError::Rejected(_), .. }
    ));
}

// === Invocation ===

#[tokio::test]
async fn test_request_approval_sends_request_as_transient() {
    let (ledger, network) = setup();
    let signer = Identity(b"signer".to_vec());
    let tx_id = TxId::new(vec![7; NONCE_LEN], b"creator".to_vec());

    let envelope = network
        .request_approval(TEST_NAMESPACE, b"request-bytes", &signer, &tx_id)
        .await
        .unwrap();
    assert!(!envelope.as_bytes().is_empty());

    let endorsements = ledger.endorsements();
    assert_eq!(endorsements.len(), 1);
    let request = &endorsements[0];
    assert_eq!(request.function, INVOKE_FUNCTION);
    assert_eq!(request.namespace, TEST_NAMESPACE);
    assert_eq!(request.network, TEST_NETWORK);
    assert_eq!(request.channel, TEST_CHANNEL);
    assert_eq!(request.signer.as_ref(), Some(&signer));
    assert_eq!(request.tx_id.as_ref(), Some(&tx_id));
    assert!(request.args.is_empty());
    assert_eq!(
        request.transient.get(TOKEN_REQUEST_KEY),
        Some(&b"request-bytes".to_vec())
    );
}

#[tokio::test]
async fn test_request_approval_surfaces_endorsement_failure() {
    let (ledger, network) = setup();
    ledger.fail_endorsement(true);

    let err = network
        .request_approval(TEST_NAMESPACE, b"req", &Identity::default(), &TxId::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Platform { source: PlatformError::Endorsement(_), .. }
    ));
}

#[tokio::test]
async fn test_compute_tx_id_assigns_then_stays_stable() {
    let (_ledger, network) = setup();

    let mut tx_id = TxId::default();
    let first = network.compute_tx_id(&mut tx_id);
    assert_eq!(tx_id.nonce.len(), NONCE_LEN);
    assert_eq!(tx_id.creator, DEFAULT_IDENTITY.to_vec());
    assert_eq!(first, tx_id_digest(&tx_id.nonce, &tx_id.creator));

    let assigned = tx_id.clone();
    assert_eq!(network.compute_tx_id(&mut tx_id), first);
    assert_eq!(tx_id, assigned);

    let mut fixed = TxId::new(vec![1, 2, 3], b"me".to_vec());
    assert_eq!(network.compute_tx_id(&mut fixed), tx_id_digest(&[1, 2, 3], b"me"));
}

#[tokio::test]
async fn test_fetch_public_parameters() {
    let (ledger, network) = setup();
    ledger.set_public_params(b"pp");
    assert_eq!(network.fetch_public_parameters(TEST_NAMESPACE).await.unwrap(), b"pp".to_vec());
}

#[tokio::test]
async fn test_query_tokens_keeps_request_order() {
    let (ledger, network) = setup();
    let a = TokenId::new("tx-a", 0);
    let b = TokenId::new("tx-b", 1);
    ledger.put_ledger_token(a.clone(), b"token-a");
    ledger.put_ledger_token(b.clone(), b"token-b");

    let ids = vec![b.clone(), a.clone()];
    let tokens = network.query_tokens(TEST_NAMESPACE, &ids).await.unwrap();
    assert_eq!(tokens, vec![b"token-b".to_vec(), b"token-a".to_vec()]);

    let query = ledger.queries().pop().unwrap();
    assert_eq!(query.function, QUERY_TOKENS_FUNCTION);
    assert_eq!(query.args, vec![serde_json::to_vec(&ids).unwrap()]);
}

#[tokio::test]
async fn test_query_tokens_wraps_platform_failure() {
    let (_ledger, network) = setup();
    let err = network
        .query_tokens(TEST_NAMESPACE, &[TokenId::new("missing", 0)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Platform { source: PlatformError::NotFound(_), .. }
    ));
}

#[tokio::test]
async fn test_are_tokens_spent() {
    let (ledger, network) = setup();
    ledger.mark_spent("b");

    let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let spent = network.are_tokens_spent(TEST_NAMESPACE, &ids).await.unwrap();
    assert_eq!(spent, vec![false, true, false]);
}

#[tokio::test]
async fn test_queries_reject_non_bytes_responses() {
    let (ledger, network) = setup();
    ledger.respond_with_non_bytes(true);

    let err = network.fetch_public_parameters(TEST_NAMESPACE).await.unwrap_err();
    assert!(matches!(err, NetworkError::Protocol(_)), "got {err:?}");

    let err = network
        .are_tokens_spent(TEST_NAMESPACE, &["a".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::Protocol(_)), "got {err:?}");
}

// === Identity ===

#[tokio::test]
async fn test_anonymous_identity_is_materialized_lazily() {
    let (ledger, network) = setup();
    let membership = network.local_membership();
    membership
        .register_identity("alice", "idemix:MSP1", "/creds/alice")
        .unwrap();
    assert_eq!(
        ledger.membership().registration("alice"),
        Some((IdentityScheme::Idemix, "MSP1".to_string(), "/creds/alice".to_string()))
    );

    let anon = membership.anonymous_identity_by_label("alice", &[]).unwrap();
    assert_eq!(anon.id, "alice");
    assert_eq!(anon.enrollment_id, "alice@MSP1");
    assert_eq!(ledger.membership().materializations(), 0);

    let (identity, audit_info) = (anon.get)().unwrap();
    assert_eq!(ledger.membership().materializations(), 1);
    assert!(identity.as_bytes().ends_with(EID_SUFFIX));
    assert_eq!(network.enrollment_id(&audit_info).unwrap(), "alice@MSP1");

    let with_audit = membership
        .anonymous_identity_by_label("alice", b"caller-audit")
        .unwrap();
    let (_, audit_info) = (with_audit.get)().unwrap();
    assert_eq!(audit_info, b"caller-audit".to_vec());
}

#[tokio::test]
async fn test_anonymous_identity_errors() {
    let (ledger, network) = setup();
    let membership = network.local_membership();
    membership
        .register_identity("alice", "idemix:MSP1", "/creds/alice")
        .unwrap();

    let err = membership.anonymous_identity_by_label("carol", &[]).unwrap_err();
    assert!(err.is_not_found());

    ledger.membership().fail_materialization(true);
    let anon = membership.anonymous_identity_by_label("alice", &[]).unwrap();
    assert!(matches!(
        (anon.get)(),
        Err(NetworkError::Platform { source: PlatformError::Unavailable(_), .. })
    ));
}

#[tokio::test]
async fn test_register_identity_type_errors() {
    let (_ledger, network) = setup();
    let membership = network.local_membership();

    assert!(matches!(
        membership.register_identity("x", "bogus", "/p"),
        Err(NetworkError::InvalidArgument(_))
    ));
    assert!(matches!(
        membership.register_identity("x", "unknown:MSP1", "/p"),
        Err(NetworkError::UnsupportedScheme(s)) if s == "unknown"
    ));
    assert!(matches!(
        membership.register_identity("x", "idemix:MSP1", ""),
        Err(NetworkError::Platform { source: PlatformError::Rejected(_), .. })
    ));
}

#[tokio::test]
async fn test_long_term_identity_round_trip() {
    let (ledger, network) = setup();
    let membership = network.local_membership();
    membership
        .register_identity("bob", "bccsp:Org1MSP", "/creds/bob")
        .unwrap();
    membership
        .register_identity("alice", "idemix:MSP1", "/creds/alice")
        .unwrap();

    let long_term = membership.long_term_identity("bob").unwrap();
    assert_eq!(long_term.id, "bob");
    assert_eq!(long_term.enrollment_id, "bob@Org1MSP");
    assert!(!long_term.identity.is_none());
    assert_eq!(membership.long_term_identifier(&long_term.identity).unwrap(), "bob");

    assert!(membership.long_term_identity("alice").unwrap_err().is_not_found());
    assert!(membership
        .long_term_identifier(&Identity(b"stranger".to_vec()))
        .unwrap_err()
        .is_not_found());

    ledger.membership().fail_materialization(true);
    assert!(membership.long_term_identity("bob").unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_membership_passthroughs() {
    let (_ledger, network) = setup();
    let membership = network.local_membership();
    let me = membership.default_identity();
    assert!(membership.is_me(&me));
    assert!(membership.is_me(&membership.anonymous_identity()));
    assert!(!membership.is_me(&Identity(b"stranger".to_vec())));
}

#[tokio::test]
async fn test_enrollment_id_from_audit_info() {
    let (_ledger, network) = setup();
    assert_eq!(network.enrollment_id(&audit_info_for("eid-7")).unwrap(), "eid-7");
    assert!(matches!(
        network.enrollment_id(b"{}"),
        Err(NetworkError::InvalidArgument(_))
    ));
}

// === Status & Finality ===

#[tokio::test]
async fn test_ledger_status_mapping() {
    let (ledger, network) = setup();
    ledger.commit("tx-ok", NativeValidationCode::VALID, &JsonRwSet::new());
    ledger.commit("tx-mvcc", NativeValidationCode::MVCC_READ_CONFLICT, &JsonRwSet::new());

    assert_eq!(network.ledger().status("tx-ok").await.unwrap(), ValidationCode::Valid);
    assert_eq!(network.ledger().status("tx-mvcc").await.unwrap(), ValidationCode::Invalid);
    assert!(network.ledger().status("tx-missing").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_status_listeners_receive_commits() {
    let (ledger, network) = setup();
    let recorder = Arc::new(RecordingListener::default());
    let listener: Arc<dyn TxStatusChangeListener> = recorder.clone();

    network.subscribe_tx_status_changes("tx1", Arc::clone(&listener)).unwrap();
    network.subscribe_tx_status_changes("tx1", Arc::clone(&listener)).unwrap();
    assert_eq!(ledger.listener_count("tx1"), 1);

    ledger.commit("tx1", NativeValidationCode::VALID, &JsonRwSet::new());
    ledger.commit("tx2", NativeValidationCode::VALID, &JsonRwSet::new());
    settle().await;
    assert_eq!(recorder.seen(), vec![("tx1".to_string(), ValidationCode::Valid)]);

    network.unsubscribe_tx_status_changes("tx1", &listener).unwrap();
    network.unsubscribe_tx_status_changes("tx1", &listener).unwrap();
    ledger.commit("tx1", NativeValidationCode::BAD_PAYLOAD, &JsonRwSet::new());
    settle().await;
    assert_eq!(recorder.seen().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_is_final_waits_for_commit() {
    let (ledger, network) = setup();
    let cancel = CancellationToken::new();

    let (result, _) = tokio::join!(network.is_final("tx1", &cancel), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        ledger.commit("tx1", NativeValidationCode::VALID, &JsonRwSet::new());
    });
    result.unwrap();

    ledger.commit("tx2", NativeValidationCode::DUPLICATE_TXID, &JsonRwSet::new());
    let parties = vec![Identity(b"auditor".to_vec())];
    let err = network
        .is_final_for_parties("tx2", &parties, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NetworkError::Platform { source: PlatformError::Rejected(_), .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_is_final_honours_cancellation() {
    let (_ledger, network) = setup();
    let cancel = CancellationToken::new();

    let (result, _) = tokio::join!(network.is_final("never", &cancel), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });
    assert!(matches!(result, Err(NetworkError::Cancelled(_))), "got {result:?}");

    let result = network.is_final_for_parties("never", &[], &cancel).await;
    assert!(matches!(result, Err(NetworkError::Cancelled(_))));
}

// === Passthroughs ===

#[tokio::test]
async fn test_envelope_and_transient_passthroughs() {
    let (ledger, network) = setup();

    assert!(!network.envelope_exists("tx1").await);
    network.store_envelope("tx1", b"env").await.unwrap();
    assert!(network.envelope_exists("tx1").await);

    let transient = TransientMap::from([("k".to_string(), b"v".to_vec())]);
    assert!(!network.transient_exists("tx1").await);
    network.store_transient("tx1", transient.clone()).await.unwrap();
    assert!(network.transient_exists("tx1").await);
    assert_eq!(network.transient("tx1").await.unwrap(), transient);
    assert!(network.transient("tx2").await.is_err());

    let envelope = network.new_envelope();
    network.broadcast(&envelope).await.unwrap();
    assert_eq!(ledger.broadcasts(), vec![envelope]);
}

#[tokio::test]
async fn test_rwset_passthrough() {
    let (_ledger, network) = setup();
    let results = JsonRwSet::new()
        .with_write(TEST_NAMESPACE, "k", b"v".to_vec())
        .encode();

    let mut rws = network.rwset("tx1", &results).await.unwrap();
    assert_eq!(rws.get_state(TEST_NAMESPACE, "k").unwrap(), Some(b"v".to_vec()));
    rws.set_state(TEST_NAMESPACE, "k2", b"v2".to_vec()).unwrap();
    assert_eq!(rws.num_writes(TEST_NAMESPACE), 2);
    rws.done();
}
