use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use twilio_notify::constants::{DOMAIN, SERVICE_SEND_MESSAGE};
use twilio_notify::prelude::*;
use twilio_notify::schema::FromNumberConstraint;
use twilio_notify::wizard::{AbortReason, FieldKind, FlowState, StepId};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Sent {
    account_sid: String,
    to: String,
    from: String,
    body: String,
    media: Vec<String>,
}

#[derive(Clone)]
enum Listing {
    Numbers(Vec<IncomingNumber>),
    AuthError,
    Unreachable,
    Garbled,
}

#[derive(Default)]
struct FakeTwilio {
    accounts: Mutex<HashMap<String, Listing>>,
    failing_targets: Mutex<Vec<String>>,
    sent: Mutex<Vec<Sent>>,
}

impl FakeTwilio {
    fn with_account(self, sid: &str, listing: Listing) -> Self {
        self.accounts.lock().unwrap().insert(sid.to_string(), listing);
        self
    }

    fn set_listing(&self, sid: &str, listing: Listing) {
        self.accounts.lock().unwrap().insert(sid.to_string(), listing);
    }

    fn fail_target(&self, to: &str) {
        self.failing_targets.lock().unwrap().push(to.to_string());
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

struct FakeClient {
    account_sid: String,
    twilio: Arc<FakeTwilio>,
}

#[async_trait]
impl SmsClient for FakeClient {
    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        if self
            .twilio
            .failing_targets
            .lock()
            .unwrap()
            .iter()
            .any(|t| t == req.to)
        {
            return Err(SmsError::Provider(format!(
                "HTTP 400: invalid To {} (code 21211)",
                req.to
            )));
        }
        self.twilio.sent.lock().unwrap().push(Sent {
            account_sid: self.account_sid.clone(),
            to: req.to.to_string(),
            from: req.from.to_string(),
            body: req.text.to_string(),
            media: req.media_urls.to_vec(),
        });
        Ok(SendResponse {
            id: fallback_id(),
            provider: "fake",
            raw: serde_json::Value::Null,
        })
    }
}

#[async_trait]
impl PhoneNumberDirectory for FakeClient {
    async fn incoming_phone_numbers(&self) -> Result<Vec<IncomingNumber>, SmsError> {
        let listing = self
            .twilio
            .accounts
            .lock()
            .unwrap()
            .get(&self.account_sid)
            .cloned()
            .unwrap_or(Listing::AuthError);
        match listing {
            Listing::Numbers(numbers) => Ok(numbers),
            Listing::AuthError => Err(SmsError::Auth("Authenticate".into())),
            Listing::Unreachable => Err(SmsError::Http("connection refused".into())),
            Listing::Garbled => Err(SmsError::Unexpected("phone number page: eof".into())),
        }
    }
}

struct FakeFactory(Arc<FakeTwilio>);

impl ClientFactory for FakeFactory {
    fn build(&self, credentials: &Credentials) -> Result<Arc<dyn ProviderClient>, SmsError> {
        Ok(Arc::new(FakeClient {
            account_sid: credentials.account_sid.clone(),
            twilio: self.0.clone(),
        }))
    }
}

#[derive(Default)]
struct RecordingActions {
    registrations: AtomicUsize,
    current: Mutex<Option<ActionSchema>>,
}

impl RecordingActions {
    fn schema(&self) -> Option<ActionSchema> {
        self.current.lock().unwrap().clone()
    }
}

impl ActionHost for RecordingActions {
    fn has_action(&self, domain: &str, action: &str) -> bool {
        assert_eq!((domain, action), (DOMAIN, SERVICE_SEND_MESSAGE));
        self.current.lock().unwrap().is_some()
    }

    fn register_action(&self, _domain: &str, _action: &str, schema: &ActionSchema) {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap() = Some(schema.clone());
    }

    fn set_action_schema(&self, _domain: &str, _action: &str, schema: &ActionSchema) {
        let mut current = self.current.lock().unwrap();
        assert!(current.is_some(), "schema published for unregistered action");
        *current = Some(schema.clone());
    }

    fn remove_action(&self, _domain: &str, _action: &str) {
        *self.current.lock().unwrap() = None;
    }
}

/// Replaces `{{ key }}` with a fixed value; unknown keys fail.
struct MapRenderer(HashMap<&'static str, &'static str>);

impl TemplateRenderer for MapRenderer {
    fn render(&self, source: &str) -> Result<String, RenderError> {
        let key = source
            .trim()
            .trim_start_matches("{{")
            .trim_end_matches("}}")
            .trim();
        self.0
            .get(key)
            .map(|v| v.to_string())
            .ok_or_else(|| RenderError::Failed {
                template: source.to_string(),
                reason: format!("'{}' is undefined", key),
            })
    }
}

struct HostUrl(Option<&'static str>);

impl ExternalUrlResolver for HostUrl {
    fn external_url(&self) -> Result<String, HostError> {
        self.0
            .map(str::to_string)
            .ok_or_else(|| HostError::NoExternalUrl("no external access configured".into()))
    }
}

/// Counts events emitted at exactly one level.
#[derive(Clone)]
struct LevelCounter {
    level: tracing::Level,
    count: Arc<AtomicUsize>,
}

impl LevelCounter {
    fn new(level: tracing::Level) -> Self {
        Self {
            level,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl<S: tracing::Subscriber> Layer<S> for LevelCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == self.level {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn number(n: &str, name: &str) -> IncomingNumber {
    IncomingNumber {
        sid: format!("PN{}", n.trim_start_matches('+')),
        phone_number: n.to_string(),
        friendly_name: name.to_string(),
    }
}

fn entry(sid: &str, numbers: &[&str], external_url: &str) -> ConfigEntry {
    ConfigEntry::new(
        "Twilio SMS",
        EntryData {
            credentials: Credentials::new(sid, "token"),
            phone_numbers: numbers.iter().map(|n| n.to_string()).collect(),
            external_url: external_url.to_string(),
        },
    )
}

struct Harness {
    twilio: Arc<FakeTwilio>,
    actions: Arc<RecordingActions>,
    dispatcher: Dispatcher,
}

fn harness(host_url: Option<&'static str>) -> Harness {
    let twilio = Arc::new(FakeTwilio::default());
    let actions = Arc::new(RecordingActions::default());
    let renderer = MapRenderer(HashMap::from([
        ("owner_phone", "+15559990000"),
        ("door_state", "Front door is open"),
        ("snapshot", "/local/snap.jpg"),
    ]));
    let dispatcher = Dispatcher::new(
        Arc::new(FakeFactory(twilio.clone())),
        actions.clone(),
        Arc::new(renderer),
        Arc::new(HostUrl(host_url)),
    );
    Harness {
        twilio,
        actions,
        dispatcher,
    }
}

fn literal_targets(targets: &[&str]) -> Vec<TemplateValue> {
    targets.iter().map(|t| TemplateValue::parse(*t)).collect()
}

// ---------------------------------------------------------------------------
// Setup flow
// ---------------------------------------------------------------------------

fn setup(twilio: Arc<FakeTwilio>, store: Arc<MemoryEntryStore>) -> SetupFlow {
    SetupFlow::new(Arc::new(FakeFactory(twilio)), store)
}

fn form(result: FlowResult) -> twilio_notify::wizard::Form {
    match result {
        FlowResult::ShowForm(form) => form,
        other => panic!("expected a form, got {other:?}"),
    }
}

#[tokio::test]
async fn setup_creates_entry_with_selected_numbers() {
    let twilio = Arc::new(FakeTwilio::default().with_account(
        "AC1",
        Listing::Numbers(vec![
            number("+15550001111", "Front Door"),
            number("+15550002222", "Garage"),
        ]),
    ));
    let store = Arc::new(MemoryEntryStore::new());
    let mut flow = setup(twilio, store.clone());

    let selection = form(flow.begin(Credentials::new("AC1", "token")).await);
    assert_eq!(selection.step, StepId::SelectNumbers);
    assert_eq!(flow.state(), FlowState::NumbersListed);
    let options = match &selection.field("phone_numbers").unwrap().kind {
        FieldKind::MultiSelect { options } => options.clone(),
        other => panic!("unexpected field kind {other:?}"),
    };
    assert_eq!(
        options[0],
        (
            "+15550001111".to_string(),
            "Front Door (+15550001111)".to_string()
        )
    );

    let result = flow
        .select_numbers(vec!["+15550002222".into()], "  https://ha.example.com/ ")
        .await;
    let created = match result {
        FlowResult::CreateEntry(entry) => entry,
        other => panic!("expected entry, got {other:?}"),
    };
    assert_eq!(created.account_sid(), "AC1");
    assert_eq!(created.data.phone_numbers, vec!["+15550002222"]);
    assert_eq!(created.data.external_url, "https://ha.example.com");
    assert_eq!(flow.state(), FlowState::ConfigurationCreated);
    assert_eq!(store.entries(), vec![created]);
}

#[tokio::test]
async fn setup_rejects_already_configured_account() {
    let twilio = Arc::new(
        FakeTwilio::default()
            .with_account("AC1", Listing::Numbers(vec![number("+15550001111", "A")])),
    );
    let store = Arc::new(MemoryEntryStore::new());
    store
        .create(entry("AC1", &["+15550001111"], ""))
        .unwrap();

    let mut flow = setup(twilio, store.clone());
    form(flow.begin(Credentials::new("AC1", "token")).await);
    let result = flow
        .select_numbers(vec!["+15550001111".into()], "")
        .await;

    assert_eq!(result, FlowResult::Abort(AbortReason::AlreadyConfigured));
    assert_eq!(store.entries().len(), 1);
    assert_eq!(flow.state(), FlowState::Aborted);
}

#[tokio::test]
async fn zero_numbers_reshows_credentials_and_keeps_input() {
    let twilio = Arc::new(FakeTwilio::default().with_account("AC1", Listing::Numbers(vec![])));
    let mut flow = setup(twilio.clone(), Arc::new(MemoryEntryStore::new()));

    let retry = form(flow.begin(Credentials::new("AC1", "token")).await);
    assert_eq!(retry.step, StepId::User);
    assert_eq!(retry.error, Some(FlowError::NoPhoneNumbers));
    assert_eq!(retry.field("account_sid").unwrap().default, Some(json!("AC1")));
    assert_eq!(flow.credentials(), Some(&Credentials::new("AC1", "token")));
    assert_eq!(flow.state(), FlowState::CredentialsEntered);

    // selecting before a successful listing goes back to credentials
    let back = form(flow.select_numbers(vec!["+1".into()], "").await);
    assert_eq!(back.step, StepId::User);

    twilio.set_listing("AC1", Listing::Numbers(vec![number("+15550001111", "A")]));
    let selection = form(flow.begin(Credentials::new("AC1", "token")).await);
    assert_eq!(selection.step, StepId::SelectNumbers);
}

#[tokio::test]
async fn provider_failures_map_to_form_errors() {
    let twilio = Arc::new(
        FakeTwilio::default()
            .with_account("ACauth", Listing::AuthError)
            .with_account("ACdown", Listing::Unreachable)
            .with_account("ACodd", Listing::Garbled),
    );
    let mut flow = setup(twilio, Arc::new(MemoryEntryStore::new()));

    for (sid, expected) in [
        ("ACauth", FlowError::InvalidAuth),
        ("ACdown", FlowError::CannotConnect),
        ("ACodd", FlowError::Unknown),
    ] {
        let retry = form(flow.begin(Credentials::new(sid, "token")).await);
        assert_eq!(retry.step, StepId::User);
        assert_eq!(retry.error, Some(expected), "account {sid}");
    }
}

#[tokio::test]
async fn empty_selection_is_reprompted() {
    let twilio = Arc::new(
        FakeTwilio::default()
            .with_account("AC1", Listing::Numbers(vec![number("+15550001111", "A")])),
    );
    let store = Arc::new(MemoryEntryStore::new());
    let mut flow = setup(twilio, store.clone());
    form(flow.begin(Credentials::new("AC1", "token")).await);

    let retry = form(flow.select_numbers(vec![], "").await);
    assert_eq!(retry.step, StepId::SelectNumbers);
    assert_eq!(retry.error, Some(FlowError::NoSelection));

    let retry = form(flow.select_numbers(vec!["+19999999999".into()], "").await);
    assert_eq!(retry.error, Some(FlowError::InvalidSelection));
    assert!(store.entries().is_empty());
}

// ---------------------------------------------------------------------------
// Options flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn options_flow_prefills_and_persists_revision() {
    let twilio = Arc::new(FakeTwilio::default().with_account(
        "AC1",
        Listing::Numbers(vec![number("+1", "One"), number("+2", "Two")]),
    ));
    let store = Arc::new(MemoryEntryStore::new());
    let created = store.create(entry("AC1", &["+1"], "https://old.example.com")).unwrap();

    let mut flow = OptionsFlow::new(Arc::new(FakeFactory(twilio)), store.clone(), created.clone());
    let initial = form(flow.init().await);
    assert_eq!(initial.step, StepId::Init);
    assert_eq!(initial.field("phone_numbers").unwrap().default, Some(json!(["+1"])));
    assert_eq!(
        initial.field("external_url").unwrap().default,
        Some(json!("https://old.example.com"))
    );
    assert_eq!(initial.field("debug").unwrap().default, Some(json!(false)));

    let empty = form(
        flow.revise(OptionsInput {
            phone_numbers: vec![],
            external_url: String::new(),
            debug: false,
        })
        .await,
    );
    assert_eq!(empty.error, Some(FlowError::NoSelection));

    let result = flow
        .revise(OptionsInput {
            phone_numbers: vec!["+2".into(), "+1".into()],
            external_url: "https://new.example.com/".into(),
            debug: true,
        })
        .await;
    let updated = match result {
        FlowResult::UpdateOptions(entry) => entry,
        other => panic!("expected update, got {other:?}"),
    };
    let settings = updated.settings();
    assert_eq!(settings.phone_numbers, vec!["+2", "+1"]);
    assert_eq!(settings.external_url.as_deref(), Some("https://new.example.com"));
    assert!(settings.debug);
    // credentials are untouched
    assert_eq!(updated.data, created.data);
    assert_eq!(store.get(&created.entry_id), Some(updated));
}

#[tokio::test]
async fn options_flow_aborts_when_provider_unreachable() {
    let twilio = Arc::new(FakeTwilio::default().with_account("AC1", Listing::Unreachable));
    let store = Arc::new(MemoryEntryStore::new());
    let created = store.create(entry("AC1", &["+1"], "")).unwrap();

    let mut flow = OptionsFlow::new(Arc::new(FakeFactory(twilio)), store.clone(), created.clone());
    let result = form(
        flow.revise(OptionsInput {
            phone_numbers: vec!["+1".into()],
            external_url: String::new(),
            debug: true,
        })
        .await,
    );
    assert_eq!(result.error, Some(FlowError::CannotConnect));
    assert!(result.fields.is_empty());
    assert_eq!(store.get(&created.entry_id), Some(created));
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[test]
fn aggregate_senders_are_an_ordered_union_without_duplicates() {
    let mut h = harness(None);
    h.dispatcher
        .activate(&entry("AC1", &["+1", "+2"], ""))
        .unwrap();
    h.dispatcher
        .activate(&entry("AC2", &["+2", "+3", "+1"], ""))
        .unwrap();

    assert_eq!(h.dispatcher.sender_numbers(), vec!["+1", "+2", "+3"]);
    assert_eq!(
        h.actions.schema().unwrap().from_number,
        FromNumberConstraint::OneOf(vec!["+1".into(), "+2".into(), "+3".into()])
    );
    assert_eq!(h.actions.registrations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shared_number_routes_to_first_registered_entry() {
    let mut h = harness(None);
    let first = entry("AC1", &["+1"], "");
    h.dispatcher.activate(&first).unwrap();
    h.dispatcher.activate(&entry("AC2", &["+1", "+2"], "")).unwrap();

    let report = h
        .dispatcher
        .invoke(&SendMessageParams::new(literal_targets(&["+5"]), "hi", "+1"))
        .await
        .unwrap();
    assert_eq!(report.entry_id, first.entry_id);
    assert_eq!(h.twilio.sent()[0].account_sid, "AC1");
}

#[tokio::test]
async fn unknown_sender_sends_nothing_and_logs_one_error() {
    let counter = LevelCounter::new(tracing::Level::ERROR);
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));

    let mut h = harness(None);
    h.dispatcher.activate(&entry("AC1", &["+1"], "")).unwrap();

    let err = h
        .dispatcher
        .invoke(&SendMessageParams::new(
            literal_targets(&["+5", "+6"]),
            "hi",
            "+9",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::UnknownSender(ref n) if n == "+9"));
    assert!(h.twilio.sent().is_empty());
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn free_text_sender_is_accepted_then_rejected_when_nothing_is_configured() {
    let h = harness(None);
    let call = json!({ "target": "+5", "message": "hi", "from_number": "+1" });

    // validation passes because no numbers are known yet
    assert!(h.dispatcher.schema().parse_call(&call).is_ok());
    let err = h.dispatcher.handle_call(&call).await.unwrap_err();
    assert!(matches!(err, DispatchError::UnknownSender(_)));
    assert!(h.twilio.sent().is_empty());
}

#[test]
fn last_deactivation_removes_action_others_refresh_schema() {
    let mut h = harness(None);
    let a = entry("AC1", &["+1"], "");
    let b = entry("AC2", &["+2"], "");
    h.dispatcher.activate(&a).unwrap();
    h.dispatcher.activate(&b).unwrap();

    assert!(h.dispatcher.deactivate(&a.entry_id));
    let schema = h.actions.schema().expect("action still registered");
    assert_eq!(
        schema.from_number,
        FromNumberConstraint::OneOf(vec!["+2".into()])
    );

    assert!(h.dispatcher.deactivate(&b.entry_id));
    assert!(h.actions.schema().is_none());
    assert!(h.dispatcher.is_empty());

    // a later activation registers again
    h.dispatcher.activate(&a).unwrap();
    assert_eq!(h.actions.registrations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn per_target_failures_do_not_stop_remaining_targets() {
    let mut h = harness(None);
    h.dispatcher.activate(&entry("AC1", &["+1"], "")).unwrap();
    h.twilio.fail_target("+6");

    let report = h
        .dispatcher
        .invoke(&SendMessageParams::new(
            literal_targets(&["+5", "+6", "+7"]),
            "hi",
            "+1",
        ))
        .await
        .unwrap();

    let targets: Vec<_> = report.outcomes.iter().map(|o| o.target.as_str()).collect();
    assert_eq!(targets, vec!["+5", "+6", "+7"]);
    assert!(report.outcomes[1].result.is_err());
    assert_eq!(report.sent(), 2);
    assert_eq!(report.failed(), 1);

    let delivered: Vec<_> = h.twilio.sent().into_iter().map(|s| s.to).collect();
    assert_eq!(delivered, vec!["+5", "+7"]);
}

#[tokio::test]
async fn templates_are_rendered_and_literals_pass_through() {
    let mut h = harness(None);
    h.dispatcher.activate(&entry("AC1", &["+1"], "https://ha.example.com/")).unwrap();

    let report = h
        .dispatcher
        .handle_call(&json!({
            "target": ["{{ owner_phone }}", "+15551112222"],
            "message": "{{ door_state }}",
            "media_url": ["{{ snapshot }}", "https://cdn.example.com/a.png"],
            "from_number": "+1"
        }))
        .await
        .unwrap();
    assert_eq!(report.sent(), 2);

    let sent = h.twilio.sent();
    assert_eq!(sent[0].to, "+15559990000");
    assert_eq!(sent[1].to, "+15551112222");
    assert_eq!(sent[0].body, "Front door is open");
    assert_eq!(sent[0].from, "+1");
    assert_eq!(
        sent[0].media,
        vec![
            "https://ha.example.com/local/snap.jpg".to_string(),
            "https://cdn.example.com/a.png".to_string(),
        ]
    );
}

#[tokio::test]
async fn render_failure_aborts_before_sending() {
    let mut h = harness(None);
    h.dispatcher.activate(&entry("AC1", &["+1"], "")).unwrap();

    let err = h
        .dispatcher
        .invoke(&SendMessageParams::new(
            literal_targets(&["+5"]),
            TemplateValue::parse("{{ missing }}"),
            "+1",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Render(_)));
    assert!(h.twilio.sent().is_empty());
}

#[tokio::test]
async fn media_falls_back_to_host_url_or_keeps_path() {
    let mut with_host = harness(Some("https://abc.ui.nabu.casa"));
    with_host.dispatcher.activate(&entry("AC1", &["+1"], "")).unwrap();
    let params = SendMessageParams::new(literal_targets(&["+5"]), "pic", "+1")
        .with_media(vec![TemplateValue::parse("/media/clip.jpg")]);
    let report = with_host.dispatcher.invoke(&params).await.unwrap();
    assert_eq!(report.media_urls, vec!["https://abc.ui.nabu.casa/media/clip.jpg"]);

    let mut without_host = harness(None);
    without_host.dispatcher.activate(&entry("AC1", &["+1"], "")).unwrap();
    let report = without_host.dispatcher.invoke(&params).await.unwrap();
    assert_eq!(report.media_urls, vec!["/media/clip.jpg"]);
    assert_eq!(report.sent(), 1);
}

#[tokio::test]
async fn reconfigure_applies_revised_options() {
    let mut h = harness(None);
    let mut e = entry("AC1", &["+1"], "");
    h.dispatcher.activate(&e).unwrap();

    e.options = EntryOptions {
        phone_numbers: Some(vec!["+2".into()]),
        external_url: Some("https://ha.example.com".into()),
        debug: Some(true),
    };
    h.dispatcher.reconfigure(&e).unwrap();

    assert_eq!(h.dispatcher.sender_numbers(), vec!["+2"]);
    assert!(h.dispatcher.is_active(&e.entry_id));
    let schema = h.actions.schema().unwrap();
    assert_eq!(schema.from_number, FromNumberConstraint::OneOf(vec!["+2".into()]));

    let err = h
        .dispatcher
        .invoke(&SendMessageParams::new(literal_targets(&["+5"]), "hi", "+1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnknownSender(_)));
}

async fn info_events_during_invoke(debug: bool) -> usize {
    let mut h = harness(None);
    let mut e = entry("AC1", &["+1"], "https://ha.example.com");
    e.options.debug = Some(debug);
    h.dispatcher.activate(&e).unwrap();

    let counter = LevelCounter::new(tracing::Level::INFO);
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));

    let report = h
        .dispatcher
        .invoke(
            &SendMessageParams::new(literal_targets(&["+5", "+6"]), "pic", "+1")
                .with_media(vec![TemplateValue::parse("/local/cam.jpg")]),
        )
        .await
        .unwrap();
    assert_eq!(report.sent(), 2);
    assert_eq!(report.media_urls, vec!["https://ha.example.com/local/cam.jpg"]);
    counter.count()
}

#[tokio::test]
async fn debug_option_raises_send_and_rewrite_diagnostics_to_info() {
    // one rewrite plus one event per target
    assert_eq!(info_events_during_invoke(true).await, 3);
    assert_eq!(info_events_during_invoke(false).await, 0);
}

// ---------------------------------------------------------------------------
// End to end against a mocked Twilio API
// ---------------------------------------------------------------------------

#[tokio::test]
async fn setup_then_send_through_twilio_api() {
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2010-04-01/Accounts/AC42/IncomingPhoneNumbers.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "incoming_phone_numbers": [
                { "sid": "PN1", "phone_number": "+15550001111", "friendly_name": "Alarm line" }
            ],
            "next_page_uri": null
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC42/Messages.json"))
        .and(body_string_contains("Body=Alarm+triggered"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sid": "SM1" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = AppConfig::default();
    config.twilio.api_base_url = server.uri();
    config.integration.default_title = "Alarm SMS".to_string();
    let store = Arc::new(MemoryEntryStore::new());

    let mut flow = SetupFlow::from_config(&config, store.clone());
    form(flow.begin(Credentials::new("AC42", "secret")).await);
    let created = match flow.select_numbers(vec!["+15550001111".into()], "").await {
        FlowResult::CreateEntry(entry) => entry,
        other => panic!("expected entry, got {other:?}"),
    };
    assert_eq!(created.title, "Alarm SMS");

    let actions = Arc::new(RecordingActions::default());
    let mut dispatcher = Dispatcher::new(
        Arc::new(config.twilio.client_factory()),
        actions,
        Arc::new(MapRenderer(HashMap::new())),
        Arc::new(HostUrl(None)),
    );
    dispatcher.activate(&created).unwrap();

    let report = dispatcher
        .handle_call(&json!({
            "target": "+15559990000",
            "message": "Alarm triggered",
            "from_number": "+15550001111"
        }))
        .await
        .unwrap();
    assert_eq!(report.sent(), 1);
    assert_eq!(report.outcomes[0].result.as_ref().unwrap().id, "SM1");
}
