//! Integration tests for the full delivery-request pipeline.
//!
//! Tests: Service → InMemoryDatabase → EventBus → Subscriber → parent row
//!
//! Verifies:
//! - Mutations commit atomically and publish only after commit
//! - Parent status converges from children and re-runs are no-ops
//! - Arrival turns requested quantities into live stock exactly once
//! - Store principals stay inside their own store

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use chrono::Utc;
    use serde_json::{Map, json};

    use intake_auth::Principal;
    use intake_catalog::{Customer, NewVariant, ProductVariant, Store, StoreDetail};
    use intake_core::{DeliveryRequestId, ProductId, StoreId, UserId};
    use intake_delivery::{
        AddStockInput, AdminStatus, CreateDeliveryRequest, DeliveryRequest, DeliveryRequestDetail,
        DeliveryStatus, NewDeliveryItem, ProductInput, ProductUpdateInput, UpdateDeliveryRequest,
        VariantInput,
        event::{ARRIVED, CANCELED, DELIVERED, PUBLISHED, SEND_MAIL, UPDATED},
    };
    use intake_events::{EventBus, HandlerRegistry, InMemoryEventBus, Subscription};
    use proptest::prelude::*;

    use crate::collaborators::{
        ProductService, TableProductService, TableShippingProfileService, seed_store,
    };
    use crate::store::{DeliveryRequestFilter, InMemoryDatabase, Pagination, Repository, RequestVariantFilter};
    use crate::workers::EventWorker;
    use crate::{
        DeliveryRequestEnvelope, DeliveryRequestHistoryService, DeliveryRequestSearchService,
        DeliveryRequestService, DeliveryRequestSubscriber, IntakeConfig, RetrieveOptions,
        SearchQuery, ServiceError, StoreError,
    };

    type Bus = Arc<InMemoryEventBus<DeliveryRequestEnvelope>>;

    struct Harness {
        db: Arc<InMemoryDatabase>,
        bus: Bus,
        service: DeliveryRequestService<Bus>,
        history: Arc<DeliveryRequestHistoryService>,
        subscriber: Arc<DeliveryRequestSubscriber<Bus>>,
        registry: HandlerRegistry<DeliveryRequestEnvelope, ServiceError>,
        search: DeliveryRequestSearchService,
        events: Subscription<DeliveryRequestEnvelope>,
        store_id: StoreId,
        admin: Principal,
        prime: Principal,
    }

    fn test_store(name: &str, owner_id: Option<UserId>, company: &str, city: &str) -> Store {
        Store {
            id: StoreId::new(),
            name: name.to_string(),
            owner_id,
            default_currency_code: None,
            detail: StoreDetail {
                company_name: Some(company.to_string()),
                phone: Some("03-1234-5678".to_string()),
                address_1: Some("1-2-3 Jingumae".to_string()),
                address_2: None,
                city: Some(city.to_string()),
                postal_code: Some("150-0001".to_string()),
            },
        }
    }

    fn setup() -> Harness {
        let db = Arc::new(InMemoryDatabase::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        // Subscribe BEFORE anything is published.
        let events = bus.subscribe();

        let owner_id = UserId::new();
        let store = test_store("Atelier Sato", Some(owner_id), "Sato Textiles", "Tokyo");
        let store_id = store.id;
        db.transaction::<_, StoreError, _>(|tx| {
            seed_store(tx, store);
            tx.customers.upsert(Customer {
                id: owner_id,
                first_name: Some("Aiko".into()),
                last_name: Some("Sato".into()),
                email: "aiko@example.com".into(),
            });
            Ok(())
        })
        .unwrap();

        let config = IntakeConfig::default();
        let products = Arc::new(TableProductService);
        let history = Arc::new(DeliveryRequestHistoryService::new(db.clone(), products.clone()));
        let service = DeliveryRequestService::new(
            db.clone(),
            bus.clone(),
            products,
            Arc::new(TableShippingProfileService),
            history.clone(),
            config.clone(),
        );
        let subscriber = Arc::new(DeliveryRequestSubscriber::new(db.clone(), bus.clone()));
        let registry = subscriber.registry();
        let search = DeliveryRequestSearchService::new(db.clone(), config);

        Harness {
            db,
            bus,
            service,
            history,
            subscriber,
            registry,
            search,
            events,
            store_id,
            admin: Principal::admin(UserId::new()),
            prime: Principal::store_prime(owner_id, store_id),
        }
    }

    impl Harness {
        /// Feed every published event to the subscriber until the bus is quiet.
        /// Returns the event types seen, in order.
        fn settle(&self) -> Vec<String> {
            let mut seen = Vec::new();
            while let Ok(envelope) = self.events.try_recv() {
                self.registry.dispatch(&envelope).unwrap();
                seen.push(envelope.event_type().to_string());
            }
            seen
        }

        fn request(&self, id: DeliveryRequestId) -> DeliveryRequest {
            self.db.read(|t| t.requests.get(&id)).unwrap().unwrap()
        }

        fn variant(&self, title: &str, product_id: ProductId) -> ProductVariant {
            self.db
                .read(|t| {
                    t.variants
                        .values()
                        .find(|v| v.product_id == product_id && v.title == title)
                        .cloned()
                })
                .unwrap()
                .unwrap()
        }

        fn root(&self, status: DeliveryStatus) -> DeliveryRequestDetail {
            self.service
                .create(
                    &self.prime,
                    CreateDeliveryRequest {
                        status,
                        ..Default::default()
                    },
                    self.store_id,
                    None,
                )
                .unwrap()
        }

        fn child(
            &self,
            root: DeliveryRequestId,
            status: DeliveryStatus,
            variants: Vec<VariantInput>,
        ) -> DeliveryRequestDetail {
            self.service
                .create(&self.prime, child_payload(status, variants), self.store_id, Some(root))
                .unwrap()
        }

        /// Pending root with one pending child requesting 10 units.
        fn submitted_batch(&self) -> (DeliveryRequestId, DeliveryRequestDetail) {
            let root = self.root(DeliveryStatus::Pending);
            let child = self.child(root.request.id, DeliveryStatus::Pending, vec![variant_input("Blue / M", 10)]);
            self.settle();
            (root.request.id, child)
        }

        fn set_admin_status(&self, id: DeliveryRequestId, admin_status: AdminStatus) -> DeliveryRequestDetail {
            self.service
                .update(
                    &self.admin,
                    id,
                    UpdateDeliveryRequest {
                        admin_status: Some(admin_status),
                        ..Default::default()
                    },
                )
                .unwrap()
        }
    }

    fn variant_input(title: &str, quantity: i64) -> VariantInput {
        VariantInput {
            title: title.to_string(),
            inventory_quantity: quantity,
            ..Default::default()
        }
    }

    fn child_payload(status: DeliveryStatus, variants: Vec<VariantInput>) -> CreateDeliveryRequest {
        let mut metadata = Map::new();
        metadata.insert("season".into(), json!("ss26"));
        CreateDeliveryRequest {
            status,
            suggested_price: Some(2500),
            background_type: Some("white".into()),
            shooting: Some("model".into()),
            metadata,
            product: Some(ProductInput {
                title: "Linen Shirt".into(),
                variants,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn product_id(detail: &DeliveryRequestDetail) -> ProductId {
        detail.request.product_id.unwrap()
    }

    /// Request rows, link rows, requested units and live stock.
    fn footprint(h: &Harness) -> (usize, usize, u64, u64) {
        h.db.read(|t| {
            let links = t.request_variants.find(&RequestVariantFilter::default());
            (
                t.requests.len(),
                links.len(),
                links.iter().map(|l| u64::from(l.delivery_quantity)).sum(),
                t.variants.values().map(|v| u64::from(v.inventory_quantity)).sum(),
            )
        })
        .unwrap()
    }

    fn variants_update(variants: Vec<VariantInput>) -> UpdateDeliveryRequest {
        UpdateDeliveryRequest {
            product: Some(ProductUpdateInput {
                variants: Some(variants),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn submitted_child_rolls_up_into_its_root() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();

        assert_eq!(child.request_variants.len(), 1);
        assert_eq!(child.request_variants[0].delivery_quantity, 10);
        assert_eq!(child.request.total_stock, 10);

        let staged = h.variant("Blue / M", product_id(&child));
        assert_eq!(staged.inventory_quantity, 0);
        assert_eq!(staged.price_in("usd"), Some(2500));

        let root = h.request(root_id);
        assert_eq!(root.total_stock, 10);
        assert!(root.released_at.is_some());
        assert_eq!(root.admin_status, Some(AdminStatus::NewRequest));
        assert_eq!(root.status, DeliveryStatus::Pending);
    }

    #[test]
    fn redelivered_events_are_no_ops() {
        let h = setup();
        let root = h.root(DeliveryStatus::Draft);
        h.child(root.request.id, DeliveryStatus::Pending, vec![variant_input("Blue / M", 3)]);

        let mut delivered = Vec::new();
        while let Ok(envelope) = h.events.try_recv() {
            h.registry.dispatch(&envelope).unwrap();
            delivered.push(envelope);
        }
        let converged = h.request(root.request.id);
        assert_eq!(converged.status, DeliveryStatus::Pending);

        for envelope in delivered.iter().rev() {
            h.registry.dispatch(envelope).unwrap();
        }
        assert_eq!(h.request(root.request.id), converged);
    }

    #[test]
    fn arrival_applies_inventory_exactly_once() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();
        let child_id = child.request.id;

        let arrived = h.set_admin_status(child_id, AdminStatus::Arrived);
        assert_eq!(arrived.request.status, DeliveryStatus::Delivered);
        assert!(arrived.request.delivered_at.is_some());
        assert_eq!(h.variant("Blue / M", product_id(&child)).inventory_quantity, 10);

        let events = h.settle();
        assert!(events.iter().any(|e| e == ARRIVED));
        assert!(events.iter().any(|e| e == DELIVERED));

        h.set_admin_status(child_id, AdminStatus::Arrived);
        assert_eq!(h.variant("Blue / M", product_id(&child)).inventory_quantity, 10);

        h.settle();
        let root = h.request(root_id);
        assert_eq!(root.status, DeliveryStatus::Delivered);
        assert_eq!(root.admin_status, Some(AdminStatus::Arrived));
        assert!(root.delivered_at.is_some());
    }

    #[test]
    fn received_override_is_what_becomes_stock() {
        let h = setup();
        let root = h.root(DeliveryStatus::Pending);
        let mut short = variant_input("Blue / M", 10);
        short.different_quantity_flag = true;
        short.different_quantity = Some(7);
        let child = h.child(root.request.id, DeliveryStatus::Pending, vec![short]);

        h.set_admin_status(child.request.id, AdminStatus::Arrived);
        assert_eq!(h.variant("Blue / M", product_id(&child)).inventory_quantity, 7);
    }

    #[test]
    fn add_inventory_is_admin_only() {
        let h = setup();
        let (_, child) = h.submitted_batch();
        let id = child.request.id;

        // A row that reached `arrived` without its stock being applied.
        h.db.transaction::<_, StoreError, _>(|tx| {
            let mut row = tx.requests.get(&id).unwrap();
            row.admin_status = Some(AdminStatus::Arrived);
            tx.requests.save(row)?;
            Ok(())
        })
        .unwrap();

        let denied = h.service.add_inventory(&h.prime, id);
        assert!(matches!(denied, Err(ServiceError::NotAllowed(_))));
        assert_eq!(h.variant("Blue / M", product_id(&child)).inventory_quantity, 0);

        assert_eq!(h.service.add_inventory(&h.admin, id).unwrap(), 10);
        assert_eq!(h.variant("Blue / M", product_id(&child)).inventory_quantity, 10);
        assert!(h.request(id).inventory_applied_at.is_some());

        let again = h.service.add_inventory(&h.admin, id);
        assert!(matches!(again, Err(ServiceError::NotAllowed(_))));
        assert_eq!(h.variant("Blue / M", product_id(&child)).inventory_quantity, 10);
    }

    #[test]
    fn add_inventory_never_repeats_an_arrival() {
        let h = setup();
        let (_, child) = h.submitted_batch();
        let id = child.request.id;

        let pending = h.service.add_inventory(&h.admin, id);
        assert!(matches!(pending, Err(ServiceError::NotAllowed(_))));
        assert_eq!(h.variant("Blue / M", product_id(&child)).inventory_quantity, 0);

        h.set_admin_status(id, AdminStatus::Arrived);
        assert_eq!(h.variant("Blue / M", product_id(&child)).inventory_quantity, 10);

        let repeated = h.service.add_inventory(&h.admin, id);
        assert!(matches!(repeated, Err(ServiceError::NotAllowed(_))));
        assert_eq!(h.variant("Blue / M", product_id(&child)).inventory_quantity, 10);

        // Leaving `arrived` and coming back does not count as a second arrival.
        h.set_admin_status(id, AdminStatus::QuantityConfirm);
        h.set_admin_status(id, AdminStatus::Arrived);
        assert_eq!(h.variant("Blue / M", product_id(&child)).inventory_quantity, 10);
    }

    #[test]
    fn add_stock_without_delivered_request_is_not_found() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();

        let result = h.service.add_stock(
            &h.prime,
            AddStockInput {
                product_id: product_id(&child),
                status: DeliveryStatus::Pending,
                rank: 0,
                variants: vec![variant_input("Blue / M", 5)],
            },
            root_id,
        );
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn add_stock_copies_the_provenance_record() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();
        h.set_admin_status(child.request.id, AdminStatus::Arrived);
        h.settle();

        let existing = h.variant("Blue / M", product_id(&child));
        let restock = h
            .service
            .add_stock(
                &h.prime,
                AddStockInput {
                    product_id: product_id(&child),
                    status: DeliveryStatus::Pending,
                    rank: 1,
                    variants: vec![
                        VariantInput {
                            id: Some(existing.id),
                            ..variant_input("Blue / M", 5)
                        },
                        variant_input("Blue / L", 3),
                    ],
                },
                root_id,
            )
            .unwrap();

        assert!(restock.request.redelivery_flag);
        assert_eq!(restock.request.parent_id, Some(root_id));
        assert_eq!(restock.request.suggested_price, Some(2500));
        assert_eq!(restock.request.background_type.as_deref(), Some("white"));
        assert_eq!(restock.request.total_stock, 8);
        assert_eq!(restock.request_variants.len(), 2);

        assert_eq!(h.variant("Blue / M", product_id(&child)).inventory_quantity, 10);
        let added = h.variant("Blue / L", product_id(&child));
        assert_eq!(added.inventory_quantity, 0);
        assert_eq!(added.price_in("usd"), Some(2500));
    }

    #[test]
    fn cancel_only_applies_to_pending_children() {
        let h = setup();
        let root = h.root(DeliveryStatus::Draft);
        let draft = h.child(root.request.id, DeliveryStatus::Draft, vec![variant_input("Blue / M", 1)]);
        h.settle();

        let before = h.request(draft.request.id);
        let result = h.service.cancel(&h.prime, draft.request.id);
        assert!(matches!(result, Err(ServiceError::NotAllowed(_))));
        assert_eq!(h.request(draft.request.id), before);
        assert!(h.settle().is_empty());

        let root_cancel = h.service.cancel(&h.prime, root.request.id);
        assert!(matches!(root_cancel, Err(ServiceError::NotAllowed(_))));
    }

    #[test]
    fn cancelling_the_only_child_cancels_the_root() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();

        let cancelled = h.service.cancel(&h.prime, child.request.id).unwrap();
        assert_eq!(cancelled.status, DeliveryStatus::Cancelled);
        assert_eq!(cancelled.admin_status, Some(AdminStatus::Cancelled));
        assert!(cancelled.canceled_at.is_some());

        let events = h.settle();
        assert!(events.iter().any(|e| e == CANCELED));
        assert!(events.iter().any(|e| e == UPDATED));

        let root = h.request(root_id);
        assert_eq!(root.status, DeliveryStatus::Cancelled);
        assert!(root.canceled_at.is_some());
        assert_eq!(root.total_stock, 0);
    }

    #[test]
    fn deleting_a_root_cascades_to_every_child() {
        let h = setup();
        let root = h.root(DeliveryStatus::Pending);
        let children: Vec<_> = (0..3)
            .map(|i| {
                h.child(root.request.id, DeliveryStatus::Pending, vec![variant_input("Blue / M", i)])
                    .request
                    .id
            })
            .collect();

        h.service.delete(&h.prime, root.request.id, true).unwrap();

        for id in children.into_iter().chain([root.request.id]) {
            let row = h.request(id);
            assert_eq!(row.status, DeliveryStatus::Deleted);
            assert!(row.deleted_at.is_some());
        }
        let hidden = h.service.retrieve(
            &h.prime,
            &DeliveryRequestFilter::by_id(root.request.id),
            RetrieveOptions::default(),
        );
        assert!(matches!(hidden, Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn deleting_the_last_child_deletes_the_root() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();

        h.service.delete(&h.prime, child.request.id, false).unwrap();
        h.settle();

        let root = h.request(root_id);
        assert_eq!(root.status, DeliveryStatus::Deleted);
        assert!(root.deleted_at.is_some());
    }

    #[test]
    fn empty_root_without_history_is_removed() {
        let h = setup();
        let root = h.root(DeliveryStatus::Draft);

        h.service.delete(&h.prime, root.request.id, true).unwrap();
        assert!(h.db.read(|t| t.requests.get(&root.request.id)).unwrap().is_none());
        h.settle();
    }

    #[test]
    fn delete_checks_the_row_shape() {
        let h = setup();
        let (_, child) = h.submitted_batch();

        let result = h.service.delete(&h.prime, child.request.id, true);
        assert!(matches!(result, Err(ServiceError::InvalidData(_))));
        assert_eq!(h.request(child.request.id).status, DeliveryStatus::Pending);
    }

    #[test]
    fn create_many_builds_one_tree_per_call() {
        let h = setup();
        let item = |quantity| NewDeliveryItem {
            store_id: h.store_id,
            request: child_payload(DeliveryStatus::Pending, vec![variant_input("Blue / M", quantity)]),
        };

        let tree = h.service.create_many(&h.prime, vec![item(2), item(5)]).unwrap();
        assert!(tree.request.is_root());
        assert_eq!(tree.children.len(), 2);
        h.settle();
        assert_eq!(h.request(tree.request.id).total_stock, 7);

        let mixed = h.service.create_many(
            &h.prime,
            vec![
                item(1),
                NewDeliveryItem {
                    store_id: h.store_id,
                    request: child_payload(DeliveryStatus::Draft, vec![]),
                },
            ],
        );
        assert!(matches!(mixed, Err(ServiceError::InvalidData(_))));
    }

    #[test]
    fn invalid_payloads_write_nothing() {
        let h = setup();
        let root = h.root(DeliveryStatus::Pending);
        h.settle();
        let rows_before = h.db.read(|t| t.requests.len()).unwrap();

        let negative = h.service.create(
            &h.prime,
            child_payload(DeliveryStatus::Pending, vec![variant_input("Blue / M", -4)]),
            h.store_id,
            Some(root.request.id),
        );
        assert!(matches!(negative, Err(ServiceError::InvalidData(_))));

        let mut overridden = variant_input("Blue / M", 4);
        overridden.different_quantity_flag = true;
        overridden.different_quantity = Some(2);
        let draft = h.service.create(
            &h.prime,
            child_payload(DeliveryStatus::Draft, vec![overridden]),
            h.store_id,
            Some(root.request.id),
        );
        assert!(matches!(draft, Err(ServiceError::InvalidData(_))));

        assert_eq!(h.db.read(|t| t.requests.len()).unwrap(), rows_before);
        assert!(h.settle().is_empty());
    }

    #[test]
    fn negative_quantity_in_an_update_writes_nothing() {
        let h = setup();
        let (_, child) = h.submitted_batch();
        let before = footprint(&h);
        let row_before = h.request(child.request.id);

        let result = h.service.update(
            &h.prime,
            child.request.id,
            variants_update(vec![variant_input("Blue / M", 3), variant_input("Blue / L", -1)]),
        );
        assert!(matches!(result, Err(ServiceError::InvalidData(_))));

        let mut received = variant_input("Blue / M", 3);
        received.different_quantity_flag = true;
        received.different_quantity = Some(-2);
        let result = h.service.update(&h.prime, child.request.id, variants_update(vec![received]));
        assert!(matches!(result, Err(ServiceError::InvalidData(_))));

        assert_eq!(footprint(&h), before);
        assert_eq!(h.request(child.request.id), row_before);
        assert!(h.settle().is_empty());
    }

    #[test]
    fn negative_quantity_in_add_stock_writes_nothing() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();
        h.set_admin_status(child.request.id, AdminStatus::Arrived);
        h.settle();
        let before = footprint(&h);

        let result = h.service.add_stock(
            &h.prime,
            AddStockInput {
                product_id: product_id(&child),
                status: DeliveryStatus::Pending,
                rank: 1,
                variants: vec![variant_input("Blue / L", 5), variant_input("Blue / XL", -5)],
            },
            root_id,
        );
        assert!(matches!(result, Err(ServiceError::InvalidData(_))));
        assert_eq!(footprint(&h), before);
        assert!(h.settle().is_empty());
    }

    fn quantity_strategy() -> impl Strategy<Value = i64> {
        prop_oneof![
            4 => 0i64..500,
            2 => -500i64..0,
            1 => any::<i64>(),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]

        #[test]
        fn stored_quantities_are_never_negative(
            requested in prop::collection::vec(quantity_strategy(), 1..4),
            received in prop::option::of(quantity_strategy()),
        ) {
            let h = setup();
            let (root_id, arrived) = h.submitted_batch();
            h.set_admin_status(arrived.request.id, AdminStatus::Arrived);
            let pending = h.child(root_id, DeliveryStatus::Pending, vec![variant_input("Grey / M", 2)]);
            h.settle();

            let mut inputs: Vec<VariantInput> = requested
                .iter()
                .enumerate()
                .map(|(i, q)| variant_input(&format!("Size {i}"), *q))
                .collect();
            if let Some(q) = received {
                inputs[0].different_quantity_flag = true;
                inputs[0].different_quantity = Some(q);
            }
            let valid = requested.iter().chain(received.iter()).all(|q| u32::try_from(*q).is_ok());
            let expected_total: u64 = if valid { requested.iter().map(|q| *q as u64).sum() } else { 0 };

            let results = [
                h.service.create(
                    &h.prime,
                    child_payload(DeliveryStatus::Pending, inputs.clone()),
                    h.store_id,
                    Some(root_id),
                ),
                h.service.update(&h.prime, pending.request.id, variants_update(inputs.clone())),
                h.service.add_stock(
                    &h.prime,
                    AddStockInput {
                        product_id: product_id(&arrived),
                        status: DeliveryStatus::Pending,
                        rank: 1,
                        variants: inputs.clone(),
                    },
                    root_id,
                ),
            ];

            if valid {
                for result in results {
                    let detail = result.unwrap();
                    prop_assert_eq!(detail.request.total_stock, expected_total);
                    let linked: u64 = detail
                        .request_variants
                        .iter()
                        .map(|v| u64::from(v.delivery_quantity))
                        .sum();
                    prop_assert_eq!(linked, expected_total);
                }
            } else {
                for result in &results {
                    prop_assert!(
                        matches!(result, Err(ServiceError::InvalidData(_))),
                        "expected invalid data, got {:?}",
                        result.as_ref().err()
                    );
                }
            }
        }

        #[test]
        fn rejected_quantities_leave_no_trace(
            good in 0i64..500,
            bad in i64::MIN..0,
        ) {
            let h = setup();
            let (root_id, arrived) = h.submitted_batch();
            h.set_admin_status(arrived.request.id, AdminStatus::Arrived);
            let pending = h.child(root_id, DeliveryStatus::Pending, vec![variant_input("Grey / M", 2)]);
            h.settle();
            let before = footprint(&h);

            let inputs = vec![variant_input("Size A", good), variant_input("Size B", bad)];
            let created = h.service.create(
                &h.prime,
                child_payload(DeliveryStatus::Pending, inputs.clone()),
                h.store_id,
                Some(root_id),
            );
            let updated = h.service.update(&h.prime, pending.request.id, variants_update(inputs.clone()));
            let restocked = h.service.add_stock(
                &h.prime,
                AddStockInput {
                    product_id: product_id(&arrived),
                    status: DeliveryStatus::Pending,
                    rank: 1,
                    variants: inputs,
                },
                root_id,
            );

            prop_assert!(matches!(created, Err(ServiceError::InvalidData(_))));
            prop_assert!(matches!(updated, Err(ServiceError::InvalidData(_))));
            prop_assert!(matches!(restocked, Err(ServiceError::InvalidData(_))));
            prop_assert_eq!(footprint(&h), before);
            prop_assert!(h.settle().is_empty());
        }
    }

    #[test]
    fn principals_stay_inside_their_permissions() {
        let h = setup();
        let (_, child) = h.submitted_batch();
        let child_id = child.request.id;

        let staff = Principal::store_staff(UserId::new(), h.store_id);
        let created = h.service.create(&staff, CreateDeliveryRequest::default(), h.store_id, None);
        assert!(matches!(created, Err(ServiceError::NotAllowed(_))));

        let stranger = Principal::store_prime(UserId::new(), StoreId::new());
        let updated = h.service.update(&stranger, child_id, UpdateDeliveryRequest::default());
        assert!(matches!(updated, Err(ServiceError::NotAllowed(_))));

        let stopped = h.service.stop_delivery_request(&h.prime, child_id);
        assert!(matches!(stopped, Err(ServiceError::NotAllowed(_))));

        let confirm = h.service.update(
            &h.prime,
            child_id,
            UpdateDeliveryRequest {
                admin_status: Some(AdminStatus::AdminConfirm),
                ..Default::default()
            },
        );
        assert!(matches!(confirm, Err(ServiceError::NotAllowed(_))));
        assert_eq!(h.request(child_id).admin_status, Some(AdminStatus::NewRequest));
    }

    #[test]
    fn submitting_a_draft_child_resets_it_and_notifies() {
        let h = setup();
        let root = h.root(DeliveryStatus::Draft);
        let draft = h.child(root.request.id, DeliveryStatus::Draft, vec![variant_input("Blue / M", 2)]);
        h.settle();

        let submitted = h
            .service
            .update(
                &h.prime,
                draft.request.id,
                UpdateDeliveryRequest {
                    status: Some(DeliveryStatus::Pending),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(submitted.request.admin_status, Some(AdminStatus::NewRequest));
        assert!(submitted.request.released_at.is_some());
        assert!(submitted.request.created_at >= draft.request.created_at);

        let events = h.settle();
        assert!(events.iter().any(|e| e == SEND_MAIL));
        assert_eq!(h.request(root.request.id).status, DeliveryStatus::Pending);
    }

    #[test]
    fn variant_payload_replaces_links_but_not_live_stock() {
        let h = setup();
        let root = h.root(DeliveryStatus::Pending);
        let child = h.child(
            root.request.id,
            DeliveryStatus::Pending,
            vec![variant_input("Blue / M", 10), variant_input("Blue / S", 4)],
        );
        let product = product_id(&child);
        let medium = h.variant("Blue / M", product);
        let small = h.variant("Blue / S", product);

        let updated = h
            .service
            .update(
                &h.prime,
                child.request.id,
                UpdateDeliveryRequest {
                    product: Some(ProductUpdateInput {
                        title: Some("Linen Shirt II".into()),
                        variants: Some(vec![
                            VariantInput {
                                id: Some(medium.id),
                                sku: Some("LS-M".into()),
                                ..variant_input("Blue / M", 6)
                            },
                            variant_input("Blue / XL", 2),
                        ]),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.request.total_stock, 8);
        assert_eq!(updated.product.as_ref().unwrap().product.title, "Linen Shirt II");
        assert!(h.db.read(|t| t.variants.get(&small.id).is_none()).unwrap());

        let medium_after = h.variant("Blue / M", product);
        assert_eq!(medium_after.sku.as_deref(), Some("LS-M"));
        assert_eq!(medium_after.inventory_quantity, medium.inventory_quantity);
        assert_eq!(h.variant("Blue / XL", product).price_in("usd"), Some(2500));

        let links = h
            .db
            .read(|t| t.request_variants.find(&RequestVariantFilter::for_request(child.request.id)))
            .unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().any(|l| l.variant_id == medium.id && l.delivery_quantity == 6));
    }

    #[test]
    fn admin_mutations_record_a_before_image() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();
        let child_id = child.request.id;

        h.set_admin_status(child_id, AdminStatus::QuantityConfirm);
        let page = h
            .history
            .list_history(&h.prime, child_id, Pagination::default())
            .unwrap();
        assert_eq!(page.total, 1);
        let snapshot = &page.items[0].metadata;
        assert_eq!(snapshot["admin_status"], json!("new_request"));
        assert!(snapshot.get("id").is_none());
        assert_eq!(snapshot["product"]["title"], json!("Linen Shirt"));

        let entry = h.history.get_one(&h.admin, page.items[0].id).unwrap();
        assert_eq!(entry.target.id, child_id);
        assert_eq!(entry.history.created_by, h.admin.user_id);
        assert!(entry.creator.is_none());

        h.service
            .update(
                &h.admin,
                root_id,
                UpdateDeliveryRequest {
                    rank: Some(3),
                    ..Default::default()
                },
            )
            .unwrap();
        let root_history = h
            .history
            .list_history(&h.admin, root_id, Pagination::default())
            .unwrap();
        assert_eq!(root_history.items[0].metadata["children"].as_array().unwrap().len(), 1);

        // Store principals do not leave an audit trail.
        h.service.save_note(&h.prime, child_id, "checked").unwrap();
        let first_page = h
            .history
            .list_history(&h.admin, child_id, IntakeConfig::default().pagination(Some(1), None))
            .unwrap();
        assert_eq!(first_page.total, 1);
        assert!(!first_page.has_more);
    }

    #[test]
    fn history_create_snapshots_on_its_own() {
        let h = setup();
        let (root_id, _) = h.submitted_batch();

        let first = h.history.create(h.admin.user_id, root_id, true).unwrap();
        let second = h.history.create(h.admin.user_id, root_id, true).unwrap();
        let page = h
            .history
            .list_history(&h.admin, root_id, IntakeConfig::default().pagination(Some(1), None))
            .unwrap();

        assert_eq!(page.total, 2);
        assert!(page.has_more);
        assert!([first.id, second.id].contains(&page.items[0].id));

        let stranger = Principal::store_prime(UserId::new(), StoreId::new());
        assert!(h.history.get_one(&stranger, first.id).is_err());
    }

    #[test]
    fn decorate_hides_deleted_children_and_unlinked_variants() {
        let h = setup();
        let root = h.root(DeliveryStatus::Pending);
        let keep = h.child(root.request.id, DeliveryStatus::Pending, vec![variant_input("Blue / M", 1)]);
        let gone = h.child(root.request.id, DeliveryStatus::Pending, vec![variant_input("Red / M", 1)]);
        h.service.delete(&h.prime, gone.request.id, false).unwrap();

        let decorated = h
            .service
            .decorate_delivery(&h.prime, root.request.id, None, None)
            .unwrap();
        assert_eq!(decorated.children.len(), 1);
        assert_eq!(decorated.children[0].request.id, keep.request.id);

        let everything = h
            .service
            .decorate_delivery(&h.prime, root.request.id, Some(&DeliveryStatus::ALL[..]), Some("linen"))
            .unwrap();
        assert_eq!(everything.children.len(), 2);
    }

    #[test]
    fn retrieve_can_pick_linked_variants() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();
        let product = product_id(&child);
        h.db.transaction::<_, ServiceError, _>(|tx| {
            TableProductService.create_variant(
                tx,
                product,
                NewVariant {
                    title: "Unlinked".into(),
                    sku: None,
                    barcode: None,
                    options: Default::default(),
                    inventory_quantity: 0,
                    prices: Vec::new(),
                    weight: None,
                },
            )
        })
        .unwrap();

        let full = h
            .service
            .retrieve(&h.prime, &DeliveryRequestFilter::by_id(root_id), RetrieveOptions::full())
            .unwrap();
        assert_eq!(full.children[0].product.as_ref().unwrap().variants.len(), 2);

        let picked = h
            .service
            .retrieve(&h.prime, &DeliveryRequestFilter::by_id(root_id), RetrieveOptions::picked())
            .unwrap();
        assert_eq!(picked.children[0].product.as_ref().unwrap().variants.len(), 1);
    }

    #[test]
    fn save_note_touches_only_the_note() {
        let h = setup();
        let (_, child) = h.submitted_batch();

        let noted = h.service.save_note(&h.prime, child.request.id, "handle with care").unwrap();
        assert_eq!(noted.note(), Some("handle with care"));
        assert_eq!(noted.metadata.get("season"), Some(&json!("ss26")));
        assert_eq!(noted.status, child.request.status);
    }

    #[test]
    fn stop_marks_review_and_pings_the_parent() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();

        let stopped = h.service.stop_delivery_request(&h.admin, child.request.id).unwrap();
        assert_eq!(stopped.admin_status, Some(AdminStatus::StopProduct));
        assert_eq!(stopped.status, DeliveryStatus::Pending);

        assert_eq!(h.settle(), vec![UPDATED.to_string()]);
        assert_eq!(h.request(root_id).admin_status, Some(AdminStatus::StopProduct));
    }

    #[test]
    fn root_reaching_published_announces_it() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();

        h.set_admin_status(child.request.id, AdminStatus::Published);
        let events = h.settle();
        assert_eq!(events.iter().filter(|e| *e == PUBLISHED).count(), 1);
        assert_eq!(h.request(root_id).admin_status, Some(AdminStatus::Published));

        // Already published: neither a re-run nor a redelivery announces again.
        assert_eq!(h.subscriber.handle_status_change(child.request.id).unwrap(), None);
        assert_eq!(h.subscriber.handle_status_change_parent(root_id).unwrap(), None);
        assert!(h.settle().is_empty());
    }

    #[test]
    fn root_published_from_a_root_event_announces_once() {
        let h = setup();
        let (root_id, child) = h.submitted_batch();

        // Move the child without letting the subscriber see it, then deliver
        // only the root's own event.
        h.set_admin_status(child.request.id, AdminStatus::Published);
        while h.events.try_recv().is_ok() {}
        h.service
            .update(&h.admin, root_id, UpdateDeliveryRequest::default())
            .unwrap();

        let events = h.settle();
        assert_eq!(events.iter().filter(|e| *e == PUBLISHED).count(), 1);
        assert_eq!(h.request(root_id).admin_status, Some(AdminStatus::Published));
    }

    #[test]
    fn search_resolves_store_text_first() {
        let h = setup();
        h.submitted_batch();

        let other = test_store("Kyoto Ceramics", None, "Tanaka Trading", "Kyoto");
        let other_id = other.id;
        h.db.transaction::<_, StoreError, _>(|tx| {
            seed_store(tx, other);
            Ok(())
        })
        .unwrap();
        let other_root = h
            .service
            .create(&h.admin, CreateDeliveryRequest::default(), other_id, None)
            .unwrap();

        let query = |text: &str| SearchQuery {
            store_query: Some(text.to_string()),
            ..Default::default()
        };

        let by_company = h.search.search(&h.admin, &query("TANAKA")).unwrap();
        assert_eq!(by_company.total, 1);
        assert_eq!(by_company.items[0].request.id, other_root.request.id);

        let by_owner = h.search.search(&h.admin, &query("sato")).unwrap();
        assert_eq!(by_owner.total, 1);
        let row = &by_owner.items[0];
        assert_eq!(row.child_count, 1);
        assert_eq!(row.product_titles, vec!["Linen Shirt".to_string()]);
        assert_eq!(row.display_code.len(), 5);
        assert_eq!(row.store.as_ref().unwrap().name, "Atelier Sato");

        let all = h.search.search(&h.admin, &SearchQuery::default()).unwrap();
        assert_eq!(all.total, 2);
        assert!(all.items[0].request.display_id > all.items[1].request.display_id);

        let staff = Principal::store_staff(UserId::new(), h.store_id);
        assert_eq!(h.search.search(&staff, &SearchQuery::default()).unwrap().total, 1);
    }

    #[test]
    fn search_filters_release_window_and_deleted_roots() {
        let h = setup();
        let (root_id, _) = h.submitted_batch();
        let released = h.request(root_id).released_at.unwrap();

        let window = |from, to| SearchQuery {
            released_from: Some(from),
            released_to: Some(to),
            ..Default::default()
        };
        let hour = chrono::Duration::hours(1);
        assert_eq!(h.search.search(&h.admin, &window(released - hour, released + hour)).unwrap().total, 1);
        assert_eq!(h.search.search(&h.admin, &window(released + hour, Utc::now() + hour * 2)).unwrap().total, 0);

        h.service.delete(&h.prime, root_id, true).unwrap();
        assert_eq!(h.search.search(&h.admin, &SearchQuery::default()).unwrap().total, 0);

        let deleted = SearchQuery {
            statuses: Some(vec![DeliveryStatus::Deleted]),
            ..Default::default()
        };
        assert_eq!(h.search.search(&h.admin, &deleted).unwrap().total, 1);
    }

    #[test]
    fn worker_thread_converges_the_tree() {
        let h = setup();
        let handle = EventWorker::spawn(
            "delivery-request-subscriber",
            &h.bus,
            h.subscriber.registry(),
            Duration::from_millis(10),
        )
        .unwrap();

        let root = h.root(DeliveryStatus::Draft);
        h.child(root.request.id, DeliveryStatus::Pending, vec![variant_input("Blue / M", 4)]);

        let deadline = Instant::now() + Duration::from_secs(2);
        while h.request(root.request.id).status != DeliveryStatus::Pending && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        handle.shutdown();

        let root = h.request(root.request.id);
        assert_eq!(root.status, DeliveryStatus::Pending);
        assert_eq!(root.admin_status, Some(AdminStatus::NewRequest));
        assert_eq!(root.total_stock, 4);
    }
}
