//! Three-slot provider fallback with per-slot rate-limit cooldowns.
//!
//! Every chat turn goes through [`FallbackOrchestrator::get_response`]:
//!
//! 1. Offline or missing primary credential: fail without touching the network.
//! 2. Expired cooldowns are cleared.
//! 3. If every slot is cooling down, report how long to wait.
//! 4. Pick the first slot: attachments always go to the vision-capable
//!    secondary; text goes to primary, or to tertiary/secondary while primary
//!    is cooling down.
//! 5. On failure, hop to the next slot following the rules in
//!    [`FallbackOrchestrator::next_hop`]. Attempts are sequential and a slot is
//!    tried at most once per turn.
//!
//! The orchestrator owns all slot state and `get_response` takes `&mut self`,
//! so only one turn can be in flight per instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, SlotConfig};
use crate::error::{ChatError, ProviderError};
use crate::store::{self, KeyValueStore};
use crate::types::{Completion, Message, ResponseResult};

use super::format::{format_messages, WireMessage};
use super::openrouter::OpenRouterClient;
use super::ChatProvider;

/// Default time a rate-limited slot is skipped.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(120);

/// Reports whether the host currently has network access.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity flag toggled by the host application.
#[derive(Debug)]
pub struct NetworkStatus {
    online: AtomicBool,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for NetworkStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    Primary,
    /// The only slot that receives image content.
    Secondary,
    Tertiary,
}

impl SlotId {
    pub const ALL: [SlotId; 3] = [SlotId::Primary, SlotId::Secondary, SlotId::Tertiary];

    fn index(self) -> usize {
        match self {
            SlotId::Primary => 0,
            SlotId::Secondary => 1,
            SlotId::Tertiary => 2,
        }
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotId::Primary => write!(f, "primary"),
            SlotId::Secondary => write!(f, "secondary"),
            SlotId::Tertiary => write!(f, "tertiary"),
        }
    }
}

/// One upstream model + credential, with its own cooldown.
#[derive(Debug, Clone)]
pub struct ProviderSlot {
    credential: Option<String>,
    model_id: String,
    rate_limited: bool,
    cooldown_until: Option<Instant>,
}

impl ProviderSlot {
    pub fn new(model_id: impl Into<String>, credential: Option<String>) -> Self {
        Self {
            credential: credential.filter(|c| !c.is_empty()),
            model_id: model_id.into(),
            rate_limited: false,
            cooldown_until: None,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    fn mark_rate_limited(&mut self, until: Instant) {
        self.rate_limited = true;
        self.cooldown_until = Some(until);
    }

    /// Clear the flag once the cooldown has passed. Returns true if it was cleared.
    fn refresh(&mut self, now: Instant) -> bool {
        match self.cooldown_until {
            Some(until) if self.rate_limited && now >= until => {
                self.rate_limited = false;
                self.cooldown_until = None;
                true
            }
            _ => false,
        }
    }
}

pub struct FallbackOrchestrator {
    provider: Arc<dyn ChatProvider>,
    connectivity: Arc<dyn Connectivity>,
    slots: [ProviderSlot; 3],
    cooldown: Duration,
}

impl FallbackOrchestrator {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        connectivity: Arc<dyn Connectivity>,
        primary: ProviderSlot,
        secondary: ProviderSlot,
        tertiary: ProviderSlot,
    ) -> Self {
        Self {
            provider,
            connectivity,
            slots: [primary, secondary, tertiary],
            cooldown: DEFAULT_COOLDOWN,
        }
    }

    /// Build the production orchestrator backed by OpenRouter.
    pub fn from_config(config: &Config, connectivity: Arc<dyn Connectivity>) -> Self {
        let slot = |s: &SlotConfig| {
            ProviderSlot::new(
                s.model.clone(),
                config.slot_api_key(s).map(str::to_string),
            )
        };
        Self::new(
            Arc::new(OpenRouterClient::new(&config.provider)),
            connectivity,
            slot(&config.slots.primary),
            slot(&config.slots.secondary),
            slot(&config.slots.tertiary),
        )
        .with_cooldown(Duration::from_secs(config.fallback.cooldown_secs))
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn slot(&self, id: SlotId) -> &ProviderSlot {
        &self.slots[id.index()]
    }

    fn slot_mut(&mut self, id: SlotId) -> &mut ProviderSlot {
        &mut self.slots[id.index()]
    }

    /// Whether real API calls are enabled (a primary credential is present).
    pub fn has_api_key(&self) -> bool {
        self.slot(SlotId::Primary).has_credential()
    }

    /// Set the shared credential on every slot that has none of its own.
    pub fn set_api_key(&mut self, api_key: &str) {
        for slot in self.slots.iter_mut() {
            if slot.credential.is_none() {
                slot.credential = Some(api_key.to_string()).filter(|k| !k.is_empty());
            }
        }
    }

    /// Startup hook: pick up a credential saved by a previous session.
    pub fn apply_stored_credential(&mut self, kv: &dyn KeyValueStore) -> bool {
        match store::api_key(kv) {
            Some(key) => {
                self.set_api_key(&key);
                info!("Loaded stored API key; real API enabled");
                true
            }
            None => {
                debug!("No stored API key found");
                self.has_api_key()
            }
        }
    }

    /// Answer one chat turn. Never fails: errors come back as a failed
    /// [`ResponseResult`] whose text is meant for the user.
    pub async fn get_response(
        &mut self,
        history: &[Message],
        latest_text: &str,
        attachments_present: bool,
    ) -> ResponseResult {
        debug!(
            "Chat turn: {} messages, latest text {} chars, attachments: {}",
            history.len(),
            latest_text.chars().count(),
            attachments_present
        );

        match self.respond(history, attachments_present).await {
            Ok(completion) => ResponseResult::success(completion.text, completion.model),
            Err(e) => {
                warn!("Chat turn failed: {}", e);
                ResponseResult::failure(e.to_string())
            }
        }
    }

    async fn respond(
        &mut self,
        history: &[Message],
        attachments_present: bool,
    ) -> Result<Completion, ChatError> {
        if !self.connectivity.is_online() {
            return Err(ChatError::NoConnectivity);
        }
        if !self.has_api_key() {
            return Err(ChatError::NoCredential);
        }

        let now = Instant::now();
        self.refresh_cooldowns(now);

        if self.all_rate_limited() {
            if let Some(wait_secs) = self.wait_secs(now) {
                return Err(ChatError::AllRateLimited {
                    wait_secs: Some(wait_secs),
                });
            }
        }

        let mut current = self
            .first_slot(attachments_present)
            .ok_or_else(|| ChatError::AllRateLimited {
                wait_secs: self.wait_secs(now),
            })?;

        let payload = format_messages(history, attachments_present);
        let mut tried = Vec::with_capacity(SlotId::ALL.len());

        loop {
            tried.push(current);
            let err = match self.invoke(current, &payload).await {
                Ok(completion) => {
                    info!(
                        "Response from {} slot (model {})",
                        current, completion.model
                    );
                    return Ok(completion);
                }
                Err(e) => e,
            };

            if err.is_rate_limited() {
                let until = Instant::now() + self.cooldown;
                self.slot_mut(current).mark_rate_limited(until);
                warn!(
                    "{} slot rate-limited, cooling down for {}s",
                    current,
                    self.cooldown.as_secs()
                );
            } else {
                warn!("{} slot failed: {}", current, err);
            }

            match self
                .next_hop(current, &err, attachments_present)
                .filter(|next| !tried.contains(next))
            {
                Some(next) => {
                    info!("Falling back from {} to {} slot", current, next);
                    current = next;
                }
                None => {
                    if err.is_rate_limited() && self.all_rate_limited() {
                        return Err(ChatError::AllRateLimited {
                            wait_secs: self.wait_secs(Instant::now()),
                        });
                    }
                    return Err(ChatError::Provider(err));
                }
            }
        }
    }

    async fn invoke(
        &self,
        id: SlotId,
        payload: &[WireMessage],
    ) -> Result<Completion, ProviderError> {
        let slot = self.slot(id);
        let credential = slot.credential.as_deref().ok_or(ProviderError::NoApiKey)?;
        debug!("Sending to {} slot (model {})", id, slot.model_id);
        self.provider.send(payload, credential, &slot.model_id).await
    }

    fn refresh_cooldowns(&mut self, now: Instant) {
        for id in SlotId::ALL {
            if self.slot_mut(id).refresh(now) {
                info!("{} slot cooldown expired", id);
            }
        }
    }

    fn is_limited(&self, id: SlotId) -> bool {
        self.slot(id).rate_limited
    }

    fn all_rate_limited(&self) -> bool {
        SlotId::ALL.iter().all(|&id| self.is_limited(id))
    }

    /// Whole seconds until the earliest future cooldown ends, rounded up.
    fn wait_secs(&self, now: Instant) -> Option<u64> {
        self.slots
            .iter()
            .filter(|s| s.rate_limited)
            .filter_map(|s| s.cooldown_until)
            .filter(|&until| until > now)
            .min()
            .map(|until| {
                let nanos = (until - now).as_nanos();
                nanos.div_ceil(1_000_000_000) as u64
            })
    }

    fn first_slot(&self, attachments_present: bool) -> Option<SlotId> {
        if attachments_present {
            Some(SlotId::Secondary)
        } else if self.is_limited(SlotId::Primary) {
            self.text_fallback()
        } else {
            Some(SlotId::Primary)
        }
    }

    /// Tertiary first, then secondary, skipping slots that are cooling down.
    fn text_fallback(&self) -> Option<SlotId> {
        [SlotId::Tertiary, SlotId::Secondary]
            .into_iter()
            .find(|&id| !self.is_limited(id))
    }

    /// Where to go after `from` failed with `err`.
    ///
    /// Primary falls back on any error; secondary only hands a rate-limited
    /// text turn to tertiary; tertiary is terminal. Image turns never leave
    /// the secondary slot.
    fn next_hop(&self, from: SlotId, err: &ProviderError, attachments_present: bool) -> Option<SlotId> {
        match from {
            SlotId::Primary if attachments_present => Some(SlotId::Secondary),
            SlotId::Primary => self.text_fallback(),
            SlotId::Secondary
                if err.is_rate_limited()
                    && !attachments_present
                    && !self.is_limited(SlotId::Tertiary) =>
            {
                Some(SlotId::Tertiary)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Attachment;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted reply for one call.
    enum Reply {
        Ok(&'static str, &'static str),
        RateLimited,
        ApiError(&'static str),
        Malformed,
    }

    /// Provider that answers from a script and records the models it was asked for.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn models(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
        }

        fn payload_lens(&self) -> Vec<usize> {
            self.calls.lock().unwrap().iter().map(|(_, n)| *n).collect()
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn send(
            &self,
            messages: &[WireMessage],
            _credential: &str,
            model: &str,
        ) -> Result<Completion, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), messages.len()));
            match self.replies.lock().unwrap().pop_front() {
                Some(Reply::Ok(text, model)) => Ok(Completion {
                    text: text.to_string(),
                    model: model.to_string(),
                    usage: None,
                }),
                Some(Reply::RateLimited) => Err(ProviderError::RateLimited),
                Some(Reply::ApiError(msg)) => Err(ProviderError::Api {
                    status: 500,
                    message: msg.to_string(),
                }),
                Some(Reply::Malformed) | None => Err(ProviderError::MalformedResponse(
                    "No message content in response".to_string(),
                )),
            }
        }
    }

    const PRIMARY: &str = "primary-model";
    const SECONDARY: &str = "vision-model";
    const TERTIARY: &str = "tertiary-model";

    fn orchestrator(provider: Arc<ScriptedProvider>, key: Option<&str>) -> FallbackOrchestrator {
        let key = key.map(str::to_string);
        FallbackOrchestrator::new(
            provider,
            Arc::new(NetworkStatus::default()),
            ProviderSlot::new(PRIMARY, key.clone()),
            ProviderSlot::new(SECONDARY, key.clone()),
            ProviderSlot::new(TERTIARY, key),
        )
    }

    fn limit(orch: &mut FallbackOrchestrator, id: SlotId, secs: u64) {
        let until = Instant::now() + Duration::from_secs(secs);
        orch.slot_mut(id).mark_rate_limited(until);
    }

    fn text_turn() -> Vec<Message> {
        vec![Message::user("hi"), Message::assistant("hello"), Message::user("again")]
    }

    fn image_turn() -> Vec<Message> {
        let img = Attachment::from_bytes("a.png", "image/png", b"png").unwrap();
        vec![Message::user("earlier"), Message::user_with_attachments("what is this", vec![img])]
    }

    #[tokio::test]
    async fn test_success_returns_provider_reported_model() {
        let provider = ScriptedProvider::new(vec![Reply::Ok("Hello", "modelX")]);
        let mut orch = orchestrator(provider.clone(), Some("k"));

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert_eq!(result, ResponseResult::success("Hello", "modelX"));
        assert_eq!(provider.models(), vec![PRIMARY]);
        assert_eq!(provider.payload_lens(), vec![3]);
    }

    #[tokio::test]
    async fn test_no_credential_skips_network() {
        let provider = ScriptedProvider::new(vec![Reply::Ok("x", "y")]);
        let mut orch = orchestrator(provider.clone(), None);

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert!(!result.success);
        assert_eq!(result.model_used, "error");
        assert!(provider.models().is_empty());
    }

    #[tokio::test]
    async fn test_offline_skips_network() {
        let provider = ScriptedProvider::new(vec![Reply::Ok("x", "y")]);
        let status = Arc::new(NetworkStatus::new(false));
        let mut orch = FallbackOrchestrator::new(
            provider.clone(),
            status.clone(),
            ProviderSlot::new(PRIMARY, Some("k".into())),
            ProviderSlot::new(SECONDARY, Some("k".into())),
            ProviderSlot::new(TERTIARY, Some("k".into())),
        );

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert!(!result.success);
        assert!(result.text.contains("offline"));
        assert!(provider.models().is_empty());

        status.set_online(true);
        let result = orch.get_response(&text_turn(), "again", false).await;
        assert!(result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_limited_reports_shortest_wait() {
        let provider = ScriptedProvider::new(vec![]);
        let mut orch = orchestrator(provider.clone(), Some("k"));
        limit(&mut orch, SlotId::Primary, 10);
        limit(&mut orch, SlotId::Secondary, 30);
        limit(&mut orch, SlotId::Tertiary, 5);

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert!(!result.success);
        assert!(result.text.contains("wait 5 seconds"), "{}", result.text);
        assert!(provider.models().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_limited_wait_rounds_up() {
        let provider = ScriptedProvider::new(vec![]);
        let mut orch = orchestrator(provider.clone(), Some("k"));
        for id in SlotId::ALL {
            limit(&mut orch, id, 10);
        }
        tokio::time::advance(Duration::from_millis(5_500)).await;

        let result = orch.get_response(&image_turn(), "what is this", true).await;
        assert!(result.text.contains("wait 5 seconds"), "{}", result.text);
        assert!(provider.models().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_limited_wait_counts_sub_millisecond_remainder() {
        let provider = ScriptedProvider::new(vec![]);
        let mut orch = orchestrator(provider.clone(), Some("k"));
        let until = Instant::now() + Duration::from_micros(5_000_500);
        for id in SlotId::ALL {
            orch.slot_mut(id).mark_rate_limited(until);
        }

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert!(result.text.contains("wait 6 seconds"), "{}", result.text);
        assert!(provider.models().is_empty());
    }

    #[tokio::test]
    async fn test_text_goes_to_primary_regardless_of_others() {
        let provider = ScriptedProvider::new(vec![Reply::Ok("ok", "p")]);
        let mut orch = orchestrator(provider.clone(), Some("k"));
        limit(&mut orch, SlotId::Secondary, 60);
        limit(&mut orch, SlotId::Tertiary, 60);

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert!(result.success);
        assert_eq!(provider.models(), vec![PRIMARY]);
    }

    #[tokio::test]
    async fn test_attachments_never_reach_primary() {
        let provider = ScriptedProvider::new(vec![Reply::Ok("a cat", "vision")]);
        let mut orch = orchestrator(provider.clone(), Some("k"));

        let result = orch.get_response(&image_turn(), "what is this", true).await;
        assert_eq!(result, ResponseResult::success("a cat", "vision"));
        assert_eq!(provider.models(), vec![SECONDARY]);
        assert_eq!(provider.payload_lens(), vec![1]);
    }

    #[tokio::test]
    async fn test_rate_limited_image_turn_has_no_fallback() {
        let provider = ScriptedProvider::new(vec![Reply::RateLimited, Reply::Ok("x", "y")]);
        let mut orch = orchestrator(provider.clone(), Some("k"));

        let result = orch.get_response(&image_turn(), "what is this", true).await;
        assert!(!result.success);
        assert_eq!(result.model_used, "error");
        assert_eq!(provider.models(), vec![SECONDARY]);
        assert!(orch.slot(SlotId::Secondary).is_rate_limited());
    }

    #[tokio::test]
    async fn test_primary_rate_limit_falls_back_to_tertiary() {
        let provider = ScriptedProvider::new(vec![Reply::RateLimited, Reply::Ok("ok", "tertiary-reported")]);
        let mut orch = orchestrator(provider.clone(), Some("k"));

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert_eq!(result, ResponseResult::success("ok", "tertiary-reported"));
        assert_eq!(provider.models(), vec![PRIMARY, TERTIARY]);
        assert!(orch.slot(SlotId::Primary).is_rate_limited());
        assert!(!orch.slot(SlotId::Tertiary).is_rate_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_sets_cooldown_and_expires() {
        let provider = ScriptedProvider::new(vec![
            Reply::RateLimited,
            Reply::Ok("ok", "t"),
            Reply::Ok("back", "p"),
        ]);
        let mut orch = orchestrator(provider.clone(), Some("k"));

        let start = Instant::now();
        orch.get_response(&text_turn(), "again", false).await;
        assert!(orch.slot(SlotId::Primary).is_rate_limited());
        assert_eq!(
            orch.slot(SlotId::Primary).cooldown_until(),
            Some(start + Duration::from_secs(120))
        );

        tokio::time::advance(Duration::from_secs(120)).await;
        let result = orch.get_response(&text_turn(), "again", false).await;
        assert_eq!(result.text, "back");
        assert!(!orch.slot(SlotId::Primary).is_rate_limited());
        assert_eq!(orch.slot(SlotId::Primary).cooldown_until(), None);
        assert_eq!(provider.models(), vec![PRIMARY, TERTIARY, PRIMARY]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limited_primary_routes_to_tertiary_then_secondary() {
        let provider = ScriptedProvider::new(vec![Reply::Ok("t", "t"), Reply::Ok("s", "s")]);
        let mut orch = orchestrator(provider.clone(), Some("k"));
        limit(&mut orch, SlotId::Primary, 60);

        orch.get_response(&text_turn(), "again", false).await;
        limit(&mut orch, SlotId::Tertiary, 60);
        orch.get_response(&text_turn(), "again", false).await;

        assert_eq!(provider.models(), vec![TERTIARY, SECONDARY]);
    }

    #[tokio::test]
    async fn test_text_cascade_stops_after_two_hops() {
        let provider = ScriptedProvider::new(vec![
            Reply::RateLimited,
            Reply::RateLimited,
            Reply::Ok("never", "never"),
        ]);
        let mut orch = orchestrator(provider.clone(), Some("k"));

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert!(!result.success);
        assert_eq!(provider.models(), vec![PRIMARY, TERTIARY]);
        assert!(orch.slot(SlotId::Tertiary).is_rate_limited());
        assert!(!orch.slot(SlotId::Secondary).is_rate_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_to_secondary_when_tertiary_limited() {
        let provider = ScriptedProvider::new(vec![Reply::RateLimited, Reply::RateLimited]);
        let mut orch = orchestrator(provider.clone(), Some("k"));
        limit(&mut orch, SlotId::Tertiary, 30);

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert_eq!(provider.models(), vec![PRIMARY, SECONDARY]);
        // Everything is cooling down now, tertiary ends first.
        assert!(result.text.contains("wait 30 seconds"), "{}", result.text);
    }

    #[tokio::test]
    async fn test_primary_api_error_cascades_without_cooldown() {
        let provider = ScriptedProvider::new(vec![Reply::ApiError("upstream down"), Reply::Ok("ok", "t")]);
        let mut orch = orchestrator(provider.clone(), Some("k"));

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert!(result.success);
        assert_eq!(provider.models(), vec![PRIMARY, TERTIARY]);
        assert!(!orch.slot(SlotId::Primary).is_rate_limited());
    }

    #[tokio::test]
    async fn test_primary_malformed_then_tertiary_error_is_terminal() {
        let provider = ScriptedProvider::new(vec![Reply::Malformed, Reply::ApiError("nope")]);
        let mut orch = orchestrator(provider.clone(), Some("k"));

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert_eq!(result, ResponseResult::failure("API error: nope"));
        assert_eq!(provider.models(), vec![PRIMARY, TERTIARY]);
    }

    #[tokio::test]
    async fn test_next_hop_from_secondary() {
        let provider = ScriptedProvider::new(vec![]);
        let mut orch = orchestrator(provider, Some("k"));
        let rl = ProviderError::RateLimited;
        let api = ProviderError::Api {
            status: 500,
            message: "x".into(),
        };

        assert_eq!(orch.next_hop(SlotId::Secondary, &rl, false), Some(SlotId::Tertiary));
        assert_eq!(orch.next_hop(SlotId::Secondary, &rl, true), None);
        assert_eq!(orch.next_hop(SlotId::Secondary, &api, false), None);
        assert_eq!(orch.next_hop(SlotId::Tertiary, &rl, false), None);

        limit(&mut orch, SlotId::Tertiary, 60);
        assert_eq!(orch.next_hop(SlotId::Secondary, &rl, false), None);
        assert_eq!(orch.next_hop(SlotId::Primary, &api, false), Some(SlotId::Secondary));

        limit(&mut orch, SlotId::Secondary, 60);
        assert_eq!(orch.next_hop(SlotId::Primary, &rl, false), None);
    }

    #[tokio::test]
    async fn test_secondary_non_rate_limit_error_is_terminal() {
        let provider = ScriptedProvider::new(vec![Reply::ApiError("bad image"), Reply::Ok("x", "y")]);
        let mut orch = orchestrator(provider.clone(), Some("k"));

        let result = orch.get_response(&image_turn(), "what is this", true).await;
        assert_eq!(result.text, "API error: bad image");
        assert_eq!(provider.models(), vec![SECONDARY]);
        assert!(!orch.slot(SlotId::Secondary).is_rate_limited());
    }

    #[tokio::test]
    async fn test_stored_credential_enables_api() {
        let provider = ScriptedProvider::new(vec![Reply::Ok("hi", "p")]);
        let mut orch = orchestrator(provider.clone(), None);
        assert!(!orch.has_api_key());

        let mut kv = MemoryStore::default();
        crate::store::save_api_key(&mut kv, "sk-or-stored").unwrap();
        assert!(orch.apply_stored_credential(&kv));
        assert!(orch.has_api_key());

        let result = orch.get_response(&text_turn(), "again", false).await;
        assert!(result.success);
    }
}
