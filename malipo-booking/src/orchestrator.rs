use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use malipo_catalog::{CatalogError, Product, ProductCatalog};
use malipo_core::{
    AvailabilityApi, AvailabilityError, AvailabilityResult, DateRange, PaymentError,
    PaymentGateway, PaymentHandle, PaymentRequest, StkStatus,
};

use crate::models::BookingSnapshot;
use crate::poller::{PollPolicy, StatusPoller};
use crate::session::BookingSession;

/// Drives one booking session against the remote collaborators.
///
/// Every remote call snapshots the session generation before awaiting and
/// applies its result through the session afterwards; the session drops
/// anything stale. The poll loop runs as a spawned task that re-checks the
/// generation before each iteration, so a reset or a superseding action
/// observably stops it.
pub struct BookingOrchestrator {
    session: Arc<Mutex<BookingSession>>,
    availability: Arc<dyn AvailabilityApi>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<dyn ProductCatalog>,
    policy: PollPolicy,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl BookingOrchestrator {
    pub fn new(
        product: Product,
        availability: Arc<dyn AvailabilityApi>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn ProductCatalog>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(BookingSession::new(product))),
            availability,
            gateway,
            catalog,
            policy,
            poll_task: Mutex::new(None),
        }
    }

    /// Wire all three collaborator seams to a single backend, e.g. the HTTP
    /// gateway client or a test double.
    pub fn with_backend<B>(product: Product, backend: Arc<B>, policy: PollPolicy) -> Self
    where
        B: AvailabilityApi + PaymentGateway + ProductCatalog + 'static,
    {
        Self::new(
            product,
            backend.clone(),
            backend.clone(),
            backend,
            policy,
        )
    }

    pub fn session(&self) -> &Arc<Mutex<BookingSession>> {
        &self.session
    }

    pub async fn snapshot(&self) -> BookingSnapshot {
        self.session.lock().await.snapshot()
    }

    pub async fn set_dates(&self, check_in: Option<NaiveDate>, check_out: Option<NaiveDate>) {
        self.session.lock().await.set_dates(check_in, check_out);
    }

    pub async fn set_phone_number(&self, phone: &str) {
        self.session.lock().await.set_phone_number(phone);
    }

    pub async fn reset(&self) {
        self.session.lock().await.reset();
    }

    pub async fn retry(&self) {
        let _ = self.session.lock().await.retry();
    }

    /// Run an availability check for the selected dates. Local validation
    /// failures surface on the snapshot without any network call.
    pub async fn check_availability(&self) -> BookingSnapshot {
        let begun = self.session.lock().await.begin_availability_check();
        let (generation, product_id, range) = match begun {
            Ok(begun) => begun,
            Err(_) => return self.snapshot().await,
        };

        let result = self.availability.check_availability(product_id, &range).await;

        let mut session = self.session.lock().await;
        session.apply_availability(generation, result);
        session.snapshot()
    }

    /// Submit the payment for the current quote and, on successful
    /// initiation, start the status poll loop in the background.
    pub async fn submit_payment(&self) -> BookingSnapshot {
        let begun = self.session.lock().await.begin_payment();
        let (generation, request) = match begun {
            Ok(begun) => begun,
            Err(_) => return self.snapshot().await,
        };

        let result = self.gateway.initiate_stk_push(&request).await;
        let handle = self.session.lock().await.apply_initiation(generation, result);

        if let Some(handle) = handle {
            self.spawn_poll(generation, handle).await;
        }

        self.snapshot().await
    }

    /// Block until the current poll loop (if any) has finished.
    pub async fn wait_for_payment_outcome(&self) {
        let task = self.poll_task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    async fn spawn_poll(&self, generation: u64, handle: PaymentHandle) {
        let session = Arc::clone(&self.session);
        let gateway = Arc::clone(&self.gateway);
        let catalog = Arc::clone(&self.catalog);
        let policy = self.policy;

        let task = tokio::spawn(async move {
            run_poll_loop(session, gateway, catalog, policy, generation, handle).await;
        });

        *self.poll_task.lock().await = Some(task);
    }
}

async fn run_poll_loop(
    session: Arc<Mutex<BookingSession>>,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<dyn ProductCatalog>,
    policy: PollPolicy,
    generation: u64,
    handle: PaymentHandle,
) {
    let mut poller = StatusPoller::new(gateway, handle, policy);

    loop {
        // Live check before every delay-then-poll iteration, not just once.
        if session.lock().await.generation() != generation {
            debug!("poll loop superseded, stopping");
            return;
        }

        match poller.next_status().await {
            None => {
                session.lock().await.apply_poll_timeout(generation);
                return;
            }
            Some(Err(err)) => {
                session.lock().await.apply_poll_error(generation, err);
                return;
            }
            Some(Ok(status)) => {
                if !session.lock().await.apply_poll_status(generation, status) {
                    return;
                }

                match status {
                    StkStatus::Pending => {}
                    StkStatus::Failed => return,
                    StkStatus::Success => {
                        refresh_product(&session, catalog.as_ref()).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Re-fetch the booked product after a confirmed payment so the caller sees
/// fresh availability data.
async fn refresh_product(session: &Arc<Mutex<BookingSession>>, catalog: &dyn ProductCatalog) {
    let (hotel_slug, product_id) = {
        let session = session.lock().await;
        (
            session.product().hotel_slug.clone(),
            session.product().id,
        )
    };

    match catalog.find_room(&hotel_slug, product_id).await {
        Ok(product) => session.lock().await.refresh_product(product),
        Err(err) => warn!(%err, "post-payment product refresh failed"),
    }
}

/// Scripted in-memory backend for tests and local development.
pub struct MockBookingBackend {
    availability: StdMutex<Result<bool, String>>,
    initiation_rejection: StdMutex<Option<String>>,
    statuses: StdMutex<VecDeque<Result<StkStatus, String>>>,
    rooms: StdMutex<Vec<Product>>,
    availability_calls: AtomicU32,
    initiate_calls: AtomicU32,
    status_calls: AtomicU32,
    list_calls: AtomicU32,
}

impl MockBookingBackend {
    pub fn new() -> Self {
        Self {
            availability: StdMutex::new(Ok(true)),
            initiation_rejection: StdMutex::new(None),
            statuses: StdMutex::new(VecDeque::new()),
            rooms: StdMutex::new(Vec::new()),
            availability_calls: AtomicU32::new(0),
            initiate_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            list_calls: AtomicU32::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        *self.availability.lock().unwrap() = Ok(available);
    }

    pub fn fail_availability(&self, message: &str) {
        *self.availability.lock().unwrap() = Err(message.to_string());
    }

    pub fn reject_initiation(&self, detail: &str) {
        *self.initiation_rejection.lock().unwrap() = Some(detail.to_string());
    }

    /// Queue one status observation; an empty queue reports pending.
    pub fn push_status(&self, status: StkStatus) {
        self.statuses.lock().unwrap().push_back(Ok(status));
    }

    pub fn push_status_error(&self, message: &str) {
        self.statuses.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn set_rooms(&self, rooms: Vec<Product>) {
        *self.rooms.lock().unwrap() = rooms;
    }

    pub fn availability_calls(&self) -> u32 {
        self.availability_calls.load(Ordering::SeqCst)
    }

    pub fn initiate_calls(&self) -> u32 {
        self.initiate_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockBookingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AvailabilityApi for MockBookingBackend {
    async fn check_availability(
        &self,
        _product_id: i64,
        range: &DateRange,
    ) -> Result<AvailabilityResult, AvailabilityError> {
        self.availability_calls.fetch_add(1, Ordering::SeqCst);

        match self.availability.lock().unwrap().clone() {
            Ok(available) => Ok(AvailabilityResult {
                available,
                for_range: *range,
            }),
            Err(message) => Err(AvailabilityError::ServiceUnavailable(message)),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockBookingBackend {
    async fn initiate_stk_push(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError> {
        request.validate()?;
        let attempt = self.initiate_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(detail) = self.initiation_rejection.lock().unwrap().clone() {
            return Err(PaymentError::GatewayRejected(detail));
        }

        Ok(PaymentHandle {
            checkout_request_id: format!("ws_CO_mock_{}", attempt),
            payment_id: attempt.to_string(),
        })
    }

    async fn payment_status(&self, _handle: &PaymentHandle) -> Result<StkStatus, PaymentError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        match self.statuses.lock().unwrap().pop_front() {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(PaymentError::Network(message)),
            None => Ok(StkStatus::Pending),
        }
    }
}

#[async_trait]
impl ProductCatalog for MockBookingBackend {
    async fn list_rooms(&self, hotel_slug: &str) -> Result<Vec<Product>, CatalogError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        Ok(self
            .rooms
            .lock()
            .unwrap()
            .iter()
            .filter(|room| room.hotel_slug == hotel_slug)
            .cloned()
            .collect())
    }
}
