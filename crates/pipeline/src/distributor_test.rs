//! Distributor and dispatcher tests
//!
//! Pipeline lifecycle per ODID (creation, source reference counting,
//! destruction), plugin attach/detach semantics, input hot-swap, and
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::timeout;

use flowgate_config::{CollectorConfig, Config, StatsConfig};
use flowgate_protocol::{FlowMessage, Odid};

use crate::plugin::{PluginId, StoragePlugin, StoreError};
use crate::templates::TemplateStore;
use crate::{DispatchEntry, Distributor, PipelineError};

const LONG: Duration = Duration::from_secs(5);

/// Test config: small queues, no sampler noise
fn test_config() -> Config {
    config_with_limit(1024)
}

fn config_with_limit(max_data_managers: usize) -> Config {
    Config {
        collector: CollectorConfig {
            queue_capacity: 64,
            max_data_managers,
        },
        stats: StatsConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Storage plugin capturing everything it is asked to store
struct CapturePlugin {
    name: String,
    seen: Mutex<Vec<(Odid, u32)>>,
}

impl CapturePlugin {
    fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> usize {
        self.seen.lock().len()
    }

    fn seen(&self) -> Vec<(Odid, u32)> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl StoragePlugin for CapturePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(&self, message: &FlowMessage) -> Result<(), StoreError> {
        self.seen.lock().push((message.odid(), message.records()));
        Ok(())
    }
}

/// Template collaborator recording release calls
#[derive(Default)]
struct CaptureTemplates {
    released: Mutex<Vec<Odid>>,
}

impl TemplateStore for CaptureTemplates {
    fn release_odid(&self, odid: Odid) {
        self.released.lock().push(odid);
    }
}

/// Poll until `cond` holds or fail the test
async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + LONG;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn send(distributor: &Distributor, message: FlowMessage) {
    distributor
        .input_queue()
        .write(DispatchEntry::Message(Arc::new(message)), 1)
        .await
        .expect("input queue open");
}

fn data(odid: u32, records: u32) -> FlowMessage {
    FlowMessage::data(Odid::new(odid), records, Bytes::from_static(b"payload"))
}

fn source_new(odid: u32) -> FlowMessage {
    FlowMessage::source_new(Odid::new(odid), 0, Bytes::new())
}

fn source_closed(odid: u32) -> FlowMessage {
    FlowMessage::source_closed(Odid::new(odid))
}

// ============================================================================
// Pipeline creation and source reference counting
// ============================================================================

#[tokio::test]
async fn test_new_source_creates_manager() {
    let mut distributor = Distributor::new(&test_config());
    distributor.start().unwrap();

    send(&distributor, source_new(100)).await;

    wait_until("data manager for ODID 100", || {
        distributor.source_count(Odid::new(100)) == Some(1)
    })
    .await;

    assert_eq!(distributor.manager_count(), 1);
    // no plugins attached: nothing was forwarded or counted
    assert_eq!(distributor.counters().packets, 0);

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_manager_reused_for_same_odid() {
    let mut distributor = Distributor::new(&test_config());
    distributor.start().unwrap();

    send(&distributor, source_new(100)).await;
    for _ in 0..10 {
        send(&distributor, data(100, 1)).await;
    }

    wait_until("all messages dispatched", || {
        distributor.counters().packets == 10
    })
    .await;

    assert_eq!(distributor.manager_count(), 1);

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_active_message_counts_and_fans_out() {
    let mut distributor = Distributor::new(&test_config());
    let plugins: Vec<_> = (0..3).map(|i| CapturePlugin::new(format!("capture{i}"))).collect();
    for plugin in &plugins {
        distributor.attach_plugin(plugin.clone(), None);
    }
    distributor.start().unwrap();

    send(&distributor, source_new(100)).await;
    send(&distributor, data(100, 5)).await;

    // every attached plugin observes the data message
    for plugin in &plugins {
        wait_until("plugin observed the data message", || {
            plugin.seen().contains(&(Odid::new(100), 5))
        })
        .await;
    }

    assert_eq!(distributor.consumer_count(Odid::new(100)), Some(3));
    let counters = distributor.counters();
    assert_eq!(counters.packets, 1);
    assert_eq!(counters.records, 5);

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_closed_source_destroys_manager() {
    let templates = Arc::new(CaptureTemplates::default());
    let mut distributor =
        Distributor::with_templates(&test_config(), templates.clone());
    let plugin = CapturePlugin::new("capture");
    distributor.attach_plugin(plugin.clone(), None);
    distributor.start().unwrap();

    send(&distributor, source_new(100)).await;
    wait_until("manager created", || distributor.has_manager(Odid::new(100))).await;
    let forwarded_before_close = plugin.count();

    send(&distributor, source_closed(100)).await;
    wait_until("manager destroyed", || !distributor.has_manager(Odid::new(100))).await;

    // template release happened exactly once, for the right ODID
    wait_until("templates released", || !templates.released.lock().is_empty()).await;
    assert_eq!(templates.released.lock().clone(), vec![Odid::new(100)]);

    // the CLOSED message itself was never forwarded
    assert_eq!(plugin.count(), forwarded_before_close);

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_source_refcount_survives_partial_close() {
    let mut distributor = Distributor::new(&test_config());
    distributor.start().unwrap();

    // two NEW then one CLOSED: refcount 1 -> 2 -> 1
    send(&distributor, source_new(200)).await;
    send(&distributor, source_new(200)).await;
    wait_until("both sources open", || {
        distributor.source_count(Odid::new(200)) == Some(2)
    })
    .await;

    send(&distributor, source_closed(200)).await;
    wait_until("one source left", || {
        distributor.source_count(Odid::new(200)) == Some(1)
    })
    .await;

    assert!(distributor.has_manager(Odid::new(200)));

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_destroy_after_kth_close() {
    let templates = Arc::new(CaptureTemplates::default());
    let mut distributor =
        Distributor::with_templates(&test_config(), templates.clone());
    distributor.start().unwrap();

    const K: usize = 4;
    for _ in 0..K {
        send(&distributor, source_new(300)).await;
    }
    for _ in 0..K - 1 {
        send(&distributor, source_closed(300)).await;
    }
    wait_until("k-1 closes processed", || {
        distributor.source_count(Odid::new(300)) == Some(1)
    })
    .await;
    assert!(templates.released.lock().is_empty());

    send(&distributor, source_closed(300)).await;
    wait_until("manager destroyed after k-th close", || {
        !distributor.has_manager(Odid::new(300))
    })
    .await;
    wait_until("templates released", || !templates.released.lock().is_empty()).await;

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_manager_limit_drops_message() {
    let mut distributor = Distributor::new(&config_with_limit(1));
    distributor.start().unwrap();

    send(&distributor, source_new(100)).await;
    // second ODID exceeds the limit: dropped, non-fatal
    send(&distributor, source_new(200)).await;
    // fence: a later message for the surviving ODID still flows
    send(&distributor, data(100, 1)).await;

    wait_until("fence message dispatched", || {
        distributor.counters().packets == 1
    })
    .await;

    assert!(distributor.has_manager(Odid::new(100)));
    assert!(!distributor.has_manager(Odid::new(200)));
    assert_eq!(distributor.manager_count(), 1);

    timeout(LONG, distributor.close()).await.unwrap();
}

// ============================================================================
// Plugin attach/detach
// ============================================================================

#[tokio::test]
async fn test_broadcast_attach_reaches_existing_managers() {
    let mut distributor = Distributor::new(&test_config());
    distributor.start().unwrap();

    send(&distributor, source_new(100)).await;
    send(&distributor, source_new(200)).await;
    wait_until("both managers exist", || distributor.manager_count() == 2).await;

    let plugin = CapturePlugin::new("broadcast");
    let id = distributor.attach_plugin(plugin.clone(), None);

    assert!(distributor.plugin_attached(Odid::new(100), id));
    assert!(distributor.plugin_attached(Odid::new(200), id));
    assert_eq!(distributor.consumer_count(Odid::new(100)), Some(1));
    assert_eq!(distributor.consumer_count(Odid::new(200)), Some(1));

    // retained registration is re-applied when a later manager appears
    send(&distributor, source_new(300)).await;
    wait_until("third manager exists", || {
        distributor.consumer_count(Odid::new(300)) == Some(1)
    })
    .await;

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_odid_specific_attach() {
    let mut distributor = Distributor::new(&test_config());
    distributor.start().unwrap();

    send(&distributor, source_new(100)).await;
    send(&distributor, source_new(200)).await;
    wait_until("both managers exist", || distributor.manager_count() == 2).await;

    let plugin = CapturePlugin::new("only-100");
    let id = distributor.attach_plugin(plugin.clone(), Some(Odid::new(100)));

    assert!(distributor.plugin_attached(Odid::new(100), id));
    assert!(!distributor.plugin_attached(Odid::new(200), id));

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_specific_plugin_wins_at_creation() {
    let mut distributor = Distributor::new(&test_config());
    let broadcast = CapturePlugin::new("broadcast");
    let specific = CapturePlugin::new("specific");
    let broadcast_id = distributor.attach_plugin(broadcast.clone(), None);
    let specific_id =
        distributor.attach_plugin(specific.clone(), Some(Odid::new(500)));
    distributor.start().unwrap();

    // ODID with a specific plugin: broadcast plugins are not applied
    send(&distributor, source_new(500)).await;
    wait_until("manager 500 exists", || distributor.has_manager(Odid::new(500))).await;
    assert!(distributor.plugin_attached(Odid::new(500), specific_id));
    assert!(!distributor.plugin_attached(Odid::new(500), broadcast_id));

    // ODID without a specific plugin: broadcast applies
    send(&distributor, source_new(600)).await;
    wait_until("manager 600 exists", || distributor.has_manager(Odid::new(600))).await;
    assert!(distributor.plugin_attached(Odid::new(600), broadcast_id));
    assert!(!distributor.plugin_attached(Odid::new(600), specific_id));

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_detach_reduces_fanout() {
    let mut distributor = Distributor::new(&test_config());
    let keeper = CapturePlugin::new("keeper");
    let leaver = CapturePlugin::new("leaver");
    distributor.attach_plugin(keeper.clone(), None);
    let leaver_id = distributor.attach_plugin(leaver.clone(), None);
    distributor.start().unwrap();

    send(&distributor, source_new(100)).await;
    send(&distributor, data(100, 1)).await;
    wait_until("both plugins saw the first message", || {
        keeper.count() == 2 && leaver.count() == 2
    })
    .await;

    timeout(LONG, distributor.detach_plugin(leaver_id)).await.unwrap();
    assert_eq!(distributor.consumer_count(Odid::new(100)), Some(1));

    send(&distributor, data(100, 2)).await;
    wait_until("keeper saw the second message", || keeper.count() == 3).await;

    // detached plugin never observed the post-detach message
    assert_eq!(leaver.count(), 2);

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_detach_unknown_id_is_noop() {
    let distributor = Distributor::new(&test_config());
    timeout(LONG, distributor.detach_plugin(PluginId::new(999)))
        .await
        .unwrap();
}

// ============================================================================
// Input hot-swap
// ============================================================================

#[tokio::test]
async fn test_swap_before_start_is_immediate() {
    let mut distributor = Distributor::new(&test_config());
    let replacement = Arc::new(crate::SlotQueue::new(64));

    timeout(LONG, distributor.swap_input(Arc::clone(&replacement)))
        .await
        .unwrap()
        .unwrap();

    assert!(Arc::ptr_eq(&distributor.input_queue(), &replacement));
}

#[tokio::test]
async fn test_swap_while_running() {
    let mut distributor = Distributor::new(&test_config());
    let plugin = CapturePlugin::new("capture");
    distributor.attach_plugin(plugin.clone(), None);
    distributor.start().unwrap();

    let old = distributor.input_queue();
    send(&distributor, source_new(100)).await;
    send(&distributor, data(100, 1)).await;
    wait_until("message via old queue", || plugin.seen().contains(&(Odid::new(100), 1))).await;

    let replacement = Arc::new(crate::SlotQueue::new(64));
    timeout(LONG, distributor.swap_input(Arc::clone(&replacement)))
        .await
        .expect("swap completes")
        .unwrap();

    assert!(Arc::ptr_eq(&distributor.input_queue(), &replacement));

    // messages now flow through the new queue
    send(&distributor, data(100, 2)).await;
    wait_until("message via new queue", || plugin.seen().contains(&(Odid::new(100), 2))).await;

    // a message written to the abandoned queue is never read
    old.write(
        DispatchEntry::Message(Arc::new(data(100, 3))),
        1,
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!plugin.seen().contains(&(Odid::new(100), 3)));

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_swap_delivers_entries_queued_before_adoption() {
    let mut distributor = Distributor::new(&test_config());
    let plugin = CapturePlugin::new("capture");
    distributor.attach_plugin(plugin.clone(), None);
    distributor.start().unwrap();

    send(&distributor, source_new(100)).await;

    // the replacement queue already holds traffic before the swap
    let replacement = Arc::new(crate::SlotQueue::new(64));
    replacement
        .write(DispatchEntry::Message(Arc::new(data(100, 9))), 1)
        .await
        .unwrap();

    timeout(LONG, distributor.swap_input(replacement))
        .await
        .unwrap()
        .unwrap();

    wait_until("pre-queued message delivered after adoption", || {
        plugin.seen().contains(&(Odid::new(100), 9))
    })
    .await;

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_messages_written_before_start_are_delivered() {
    let mut distributor = Distributor::new(&test_config());
    let plugin = CapturePlugin::new("capture");
    distributor.attach_plugin(plugin.clone(), None);

    // decoder may begin writing before the dispatcher is spawned
    send(&distributor, source_new(100)).await;
    send(&distributor, data(100, 4)).await;

    distributor.start().unwrap();

    wait_until("pre-start messages delivered", || {
        plugin.seen().contains(&(Odid::new(100), 4))
    })
    .await;

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_swap_to_current_queue_is_noop() {
    let mut distributor = Distributor::new(&test_config());
    distributor.start().unwrap();

    let current = distributor.input_queue();
    timeout(LONG, distributor.swap_input(current))
        .await
        .unwrap()
        .unwrap();

    timeout(LONG, distributor.close()).await.unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_twice_fails() {
    let mut distributor = Distributor::new(&test_config());
    distributor.start().unwrap();

    assert!(matches!(
        distributor.start(),
        Err(PipelineError::AlreadyRunning)
    ));
    assert!(distributor.is_running());

    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_close_without_start() {
    let distributor = Distributor::new(&test_config());
    timeout(LONG, distributor.close()).await.unwrap();
}

#[tokio::test]
async fn test_close_tears_down_remaining_managers() {
    let mut distributor = Distributor::new(&test_config());
    let plugin = CapturePlugin::new("capture");
    distributor.attach_plugin(plugin.clone(), None);
    distributor.start().unwrap();

    send(&distributor, source_new(100)).await;
    send(&distributor, data(100, 7)).await;
    send(&distributor, source_new(200)).await;
    wait_until("managers exist", || distributor.manager_count() == 2).await;

    // close drains: the data message is stored before consumers stop
    timeout(LONG, distributor.close()).await.unwrap();
    assert!(plugin.seen().contains(&(Odid::new(100), 7)));
}

#[tokio::test]
async fn test_messages_processed_in_order() {
    let mut distributor = Distributor::new(&test_config());
    let plugin = CapturePlugin::new("capture");
    distributor.attach_plugin(plugin.clone(), None);
    distributor.start().unwrap();

    send(&distributor, source_new(100)).await;
    for records in 1..=20u32 {
        send(&distributor, data(100, records)).await;
    }

    wait_until("all messages stored", || plugin.count() == 21).await;

    let stored: Vec<u32> = plugin
        .seen()
        .into_iter()
        .map(|(_, records)| records)
        .collect();
    assert_eq!(stored[0], 0); // the NEW message
    assert_eq!(stored[1..], (1..=20).collect::<Vec<_>>()[..]);

    timeout(LONG, distributor.close()).await.unwrap();
}
