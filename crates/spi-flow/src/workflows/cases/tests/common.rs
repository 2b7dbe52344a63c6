use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::workflows::cases::analysis::{
    AnalysisPolicy, AnalysisReport, AnalysisRequest, AnalyzerError, ContentAnalyzer,
};
use crate::workflows::cases::audit::{AuditEvent, AuditTrail, NewAuditEvent};
use crate::workflows::cases::catalog::ServiceCode;
use crate::workflows::cases::documents::{DocumentRecord, FileRef, ReviewDecision};
use crate::workflows::cases::domain::{
    CaseId, CaseRecord, DocumentId, NewCase, PaymentKind, Principal, Role, Stage, UserId,
};
use crate::workflows::cases::memory::MemoryCaseStore;
use crate::workflows::cases::repository::{
    CaseCommit, CaseFilter, CaseNotification, CaseRepository, NotificationPublisher, NotifyError,
    RepositoryError,
};
use crate::workflows::cases::service::{CaseDetail, CaseService};
use crate::workflows::cases::time_policy::{ManualClock, PricingPolicy};

pub(super) const BASE_AMOUNT: u64 = 500_000;

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid start")
}

pub(super) fn client() -> Principal {
    Principal::new("client-ana", Role::Client, Some("acme"))
}

pub(super) fn other_client() -> Principal {
    Principal::new("client-bruno", Role::Client, Some("globex"))
}

pub(super) fn company_admin() -> Principal {
    Principal::new("admin-carla", Role::ClientAdmin, Some("acme"))
}

pub(super) fn spi_admin() -> Principal {
    Principal::new("spi-laura", Role::SpiAdmin, None)
}

pub(super) fn engine_config() -> EngineConfig {
    EngineConfig {
        pricing: PricingPolicy::default(),
        analysis: AnalysisPolicy {
            min_confidence: 0.7,
            timeout: StdDuration::from_millis(20),
            max_attempts: 2,
            initial_backoff: StdDuration::from_millis(1),
        },
    }
}

/// How the scripted analyzer answers.
#[derive(Debug, Clone)]
pub(super) enum Script {
    Confident(f32),
    WrongType(&'static str),
    PrintedExpiry(DateTime<Utc>),
    Failing,
    Stalled,
}

type Hook = Box<dyn FnOnce() + Send>;

pub(super) struct ScriptedAnalyzer {
    script: Mutex<Script>,
    calls: AtomicU32,
    before_reply: Mutex<Option<Hook>>,
}

impl ScriptedAnalyzer {
    pub(super) fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicU32::new(0),
            before_reply: Mutex::new(None),
        }
    }

    pub(super) fn set(&self, script: Script) {
        *self.script.lock().expect("script mutex poisoned") = script;
    }

    pub(super) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Runs `hook` once, while the next analysis is in flight.
    pub(super) fn before_reply(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_reply.lock().expect("hook mutex poisoned") = Some(Box::new(hook));
    }
}

#[async_trait]
impl ContentAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hook = self.before_reply.lock().expect("hook mutex poisoned").take();
        if let Some(hook) = hook {
            hook();
        }

        let script = self.script.lock().expect("script mutex poisoned").clone();
        let report = |document_type: String, confidence: f32, valid_until| AnalysisReport {
            document_type,
            confidence,
            extracted_fields: BTreeMap::from([("rut".to_string(), "76.123.456-7".to_string())]),
            valid_until,
        };
        match script {
            Script::Confident(confidence) => Ok(report(request.expected_type, confidence, None)),
            Script::WrongType(found) => Ok(report(found.to_string(), 0.95, None)),
            Script::PrintedExpiry(until) => Ok(report(request.expected_type, 0.9, Some(until))),
            Script::Failing => Err(AnalyzerError::Unavailable("classifier 502".to_string())),
            Script::Stalled => {
                tokio::time::sleep(StdDuration::from_secs(60)).await;
                Err(AnalyzerError::Unavailable("unreachable".to_string()))
            }
        }
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifications {
    events: Arc<Mutex<Vec<CaseNotification>>>,
}

impl MemoryNotifications {
    pub(super) fn templates(&self) -> Vec<String> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .iter()
            .map(|event| event.template.clone())
            .collect()
    }
}

impl NotificationPublisher for MemoryNotifications {
    fn publish(&self, notification: CaseNotification) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct OfflineNotifications;

impl NotificationPublisher for OfflineNotifications {
    fn publish(&self, _notification: CaseNotification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp offline".to_string()))
    }
}

pub(super) struct UnavailableRepository;

impl CaseRepository for UnavailableRepository {
    fn insert_case(&self, _commit: CaseCommit) -> Result<CaseCommit, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save_case(&self, _commit: CaseCommit) -> Result<CaseCommit, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_case(&self, _id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list_cases(&self, _filter: &CaseFilter) -> Result<Vec<CaseRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_document(&self, _record: DocumentRecord) -> Result<DocumentRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save_document(&self, _record: DocumentRecord) -> Result<DocumentRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_document(&self, _id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn documents_for_case(&self, _id: &CaseId) -> Result<Vec<DocumentRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn documents_for_client(
        &self,
        _client_id: &UserId,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Memory store whose next `save_document` calls fail, as a database blip would.
#[derive(Default)]
pub(super) struct FlakyStore {
    inner: MemoryCaseStore,
    failing_saves: AtomicU32,
}

impl FlakyStore {
    pub(super) fn fail_next_document_saves(&self, count: u32) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }
}

impl CaseRepository for FlakyStore {
    fn insert_case(&self, commit: CaseCommit) -> Result<CaseCommit, RepositoryError> {
        self.inner.insert_case(commit)
    }

    fn save_case(&self, commit: CaseCommit) -> Result<CaseCommit, RepositoryError> {
        self.inner.save_case(commit)
    }

    fn fetch_case(&self, id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError> {
        self.inner.fetch_case(id)
    }

    fn list_cases(&self, filter: &CaseFilter) -> Result<Vec<CaseRecord>, RepositoryError> {
        self.inner.list_cases(filter)
    }

    fn insert_document(&self, record: DocumentRecord) -> Result<DocumentRecord, RepositoryError> {
        self.inner.insert_document(record)
    }

    fn save_document(&self, record: DocumentRecord) -> Result<DocumentRecord, RepositoryError> {
        let failing = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RepositoryError::Unavailable("write timed out".to_string()));
        }
        self.inner.save_document(record)
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError> {
        self.inner.fetch_document(id)
    }

    fn documents_for_case(&self, id: &CaseId) -> Result<Vec<DocumentRecord>, RepositoryError> {
        self.inner.documents_for_case(id)
    }

    fn documents_for_client(
        &self,
        client_id: &UserId,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        self.inner.documents_for_client(client_id)
    }
}

pub(super) struct OfflineAuditTrail;

impl AuditTrail for OfflineAuditTrail {
    fn append(&self, _event: NewAuditEvent) -> Result<AuditEvent, RepositoryError> {
        Err(RepositoryError::Unavailable("audit sink offline".to_string()))
    }

    fn events_for(&self, _case_id: &CaseId) -> Result<Vec<AuditEvent>, RepositoryError> {
        Ok(Vec::new())
    }
}

pub(super) type TestService = CaseService<MemoryCaseStore, MemoryNotifications>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) store: Arc<MemoryCaseStore>,
    pub(super) notifications: Arc<MemoryNotifications>,
    pub(super) analyzer: Arc<ScriptedAnalyzer>,
    pub(super) clock: Arc<ManualClock>,
}

pub(super) fn harness() -> Harness {
    harness_with(Script::Confident(0.92))
}

pub(super) fn harness_with(script: Script) -> Harness {
    let store = Arc::new(MemoryCaseStore::default());
    let notifications = Arc::new(MemoryNotifications::default());
    let analyzer = Arc::new(ScriptedAnalyzer::new(script));
    let clock = Arc::new(ManualClock::new(start()));
    let service = CaseService::new(
        store.clone(),
        notifications.clone(),
        analyzer.clone(),
        engine_config(),
    )
    .with_clock(clock.clone());

    Harness {
        service: Arc::new(service),
        store,
        notifications,
        analyzer,
        clock,
    }
}

impl Harness {
    pub(super) fn open(&self, code: ServiceCode) -> CaseDetail {
        self.service
            .open_case(&client(), new_case(code))
            .expect("case opens")
    }

    pub(super) fn case(&self, case_id: &CaseId) -> CaseRecord {
        self.store
            .fetch_case(case_id)
            .expect("store readable")
            .expect("case stored")
    }

    pub(super) fn document(&self, document_id: &DocumentId) -> DocumentRecord {
        self.store
            .fetch_document(document_id)
            .expect("store readable")
            .expect("document stored")
    }

    pub(super) fn document_of_type(&self, case_id: &CaseId, document_type: &str) -> DocumentRecord {
        self.store
            .documents_for_case(case_id)
            .expect("store readable")
            .into_iter()
            .find(|doc| doc.document_type == document_type)
            .expect("document of requested type")
    }

    pub(super) fn submit(&self, document_id: &DocumentId) -> DocumentRecord {
        self.service
            .submit_document(
                &client(),
                document_id,
                FileRef(format!("blob://uploads/{document_id}.pdf")),
            )
            .expect("submission accepted")
    }

    pub(super) fn approve(&self, document_id: &DocumentId) -> DocumentRecord {
        self.service
            .review_document(&spi_admin(), document_id, ReviewDecision::Approve, None)
            .expect("approval accepted")
    }

    /// Submits and approves every open document on the case.
    pub(super) fn validate_all(&self, case_id: &CaseId) {
        let documents = self.store.documents_for_case(case_id).expect("store readable");
        for document in documents.iter().filter(|doc| doc.status.is_open()) {
            self.submit(&document.id);
            self.approve(&document.id);
        }
    }

    /// Drives the case forward until it reaches `target`, satisfying every gate on the way.
    pub(super) fn drive_to(&self, case_id: &CaseId, target: Stage) {
        while self.case(case_id).stage < target {
            match self.case(case_id).stage {
                Stage::PagoAdelanto => {
                    self.service
                        .confirm_payment(case_id, PaymentKind::Advance)
                        .expect("advance payment");
                }
                Stage::Gestion => self.validate_all(case_id),
                Stage::PagoCierre => {
                    self.service
                        .confirm_payment(case_id, PaymentKind::Closing)
                        .expect("closing payment");
                }
                Stage::Solicitud | Stage::Finalizado => {}
            }
            self.service.advance(&client(), case_id).expect("gate satisfied");
        }
    }

    pub(super) fn audit_texts(&self, case_id: &CaseId) -> Vec<String> {
        self.service
            .audit_log(&spi_admin(), case_id)
            .expect("audit readable")
            .into_iter()
            .map(|event| event.text)
            .collect()
    }

    pub(super) fn days_pass(&self, days: i64) {
        self.clock.advance(Duration::days(days));
    }
}

pub(super) fn new_case(code: ServiceCode) -> NewCase {
    NewCase {
        client_id: client().id,
        company_id: None,
        title: "Registro marca Andes".to_string(),
        service_code: code,
        amount_base: BASE_AMOUNT,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
