//! `intake-demo`: walks one delivery batch from submission to arrival on the
//! in-memory stack and prints the converged root.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};

use intake_auth::Principal;
use intake_catalog::{Store, StoreDetail};
use intake_core::{StoreId, UserId};
use intake_delivery::{
    AdminStatus, CreateDeliveryRequest, DeliveryStatus, ProductInput, UpdateDeliveryRequest,
    VariantInput,
};
use intake_events::InMemoryEventBus;
use intake_infra::collaborators::{TableProductService, TableShippingProfileService, seed_store};
use intake_infra::store::{DeliveryRequestFilter, InMemoryDatabase, Repository};
use intake_infra::workers::EventWorker;
use intake_infra::{
    DeliveryRequestEnvelope, DeliveryRequestHistoryService, DeliveryRequestService,
    DeliveryRequestSubscriber, IntakeConfig, RetrieveOptions, StoreError,
};

fn main() -> anyhow::Result<()> {
    intake_observability::init();
    let config = IntakeConfig::from_env();

    let db = Arc::new(InMemoryDatabase::new());
    let bus: Arc<InMemoryEventBus<DeliveryRequestEnvelope>> = Arc::new(InMemoryEventBus::new());

    let owner_id = UserId::new();
    let store_id = StoreId::new();
    db.transaction::<_, StoreError, _>(|tx| {
        seed_store(
            tx,
            Store {
                id: store_id,
                name: "Demo Store".to_string(),
                owner_id: Some(owner_id),
                default_currency_code: None,
                detail: StoreDetail {
                    company_name: Some("Demo Trading".to_string()),
                    city: Some("Tokyo".to_string()),
                    ..StoreDetail::default()
                },
            },
        );
        Ok(())
    })
    .context("seeding demo store")?;

    let products = Arc::new(TableProductService);
    let history = Arc::new(DeliveryRequestHistoryService::new(db.clone(), products.clone()));
    let service = DeliveryRequestService::new(
        db.clone(),
        bus.clone(),
        products,
        Arc::new(TableShippingProfileService),
        history,
        config.clone(),
    );
    let subscriber = Arc::new(DeliveryRequestSubscriber::new(db.clone(), bus.clone()));
    let worker = EventWorker::spawn(
        "delivery-request-subscriber",
        &bus,
        subscriber.registry(),
        config.worker_poll_interval,
    )
    .context("spawning subscriber worker")?;

    let prime = Principal::store_prime(owner_id, store_id);
    let admin = Principal::admin(UserId::new());

    let root = service.create(
        &prime,
        CreateDeliveryRequest {
            status: DeliveryStatus::Pending,
            ..Default::default()
        },
        store_id,
        None,
    )?;
    let child = service.create(
        &prime,
        CreateDeliveryRequest {
            status: DeliveryStatus::Pending,
            suggested_price: Some(4800),
            product: Some(ProductInput {
                title: "Indigo Tote".to_string(),
                variants: vec![VariantInput {
                    title: "One Size".to_string(),
                    inventory_quantity: 12,
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        },
        store_id,
        Some(root.request.id),
    )?;
    tracing::info!(display_code = %child.request.display_code(config.display_code_width), "demo child submitted");

    service.update(
        &admin,
        child.request.id,
        UpdateDeliveryRequest {
            admin_status: Some(AdminStatus::Arrived),
            ..Default::default()
        },
    )?;

    let root_id = root.request.id;
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = db
            .read(|t| t.requests.get(&root_id).map(|r| r.status))?
            .context("demo root disappeared")?;
        if status == DeliveryStatus::Delivered {
            break;
        }
        if Instant::now() >= deadline {
            worker.shutdown();
            bail!("root did not converge, still {status}");
        }
        std::thread::sleep(config.worker_poll_interval);
    }
    worker.shutdown();

    let detail = service.retrieve(&admin, &DeliveryRequestFilter::by_id(root_id), RetrieveOptions::picked())?;
    println!("{}", serde_json::to_string_pretty(&detail)?);
    Ok(())
}
