//! Delivery Request Service: the mutating entry points of the workflow.
//!
//! Every operation follows the same pipeline:
//!
//! ```text
//! load row (committed tables)  ->  authorize principal against the owning store
//!   -> snapshot history (admin mutations)  ->  apply lifecycle rule
//!   -> write rows + catalog side effects  ->  commit  ->  publish events
//! ```
//!
//! Validation and state errors abort the transaction, so nothing is written.
//! Events are published only after the commit; a publish failure is reported
//! as `ServiceError::Publish` while the committed state stands.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use intake_auth::{Action, Principal, authorize};
use intake_catalog::{Money, VariantPatch};
use intake_core::{DeliveryRequestId, ProductId, StoreId, UserId};
use intake_delivery::{
    AddStockInput, CreateDeliveryRequest, DeliveryRequest, DeliveryRequestDetail,
    DeliveryRequestEvent, DeliveryRequestVariant, DeliveryStatus, NewDeliveryItem, ProductInput,
    UpdateDeliveryRequest, VariantInput, apply_update, decorate, lifecycle,
    merge::{merge_variant, product_patch, staged_product, staged_variant},
    total_requested, validate_batch,
};
use intake_events::{EventBus, EventEnvelope};

use crate::assembly::{RetrieveOptions, load_detail};
use crate::collaborators::{ProductService, ShippingProfileService};
use crate::config::IntakeConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::history::DeliveryRequestHistoryService;
use crate::store::{
    DeliveryRequestFilter, HistoryFilter, InMemoryDatabase, Repository, RequestVariantFilter, Tables,
    Transaction,
};

/// Message type carried by the bus.
pub type DeliveryRequestEnvelope = EventEnvelope<DeliveryRequestEvent>;

/// Publish events recorded by a committed transaction.
pub(crate) fn publish_all<B>(bus: &B, events: Vec<DeliveryRequestEvent>) -> ServiceResult<()>
where
    B: EventBus<DeliveryRequestEnvelope>,
{
    for event in events {
        let envelope = EventEnvelope::wrap(event);
        debug!(event_type = envelope.event_type(), event_id = %envelope.event_id(), "publishing event");
        bus.publish(envelope)
            .map_err(|err| ServiceError::Publish(format!("{err:?}")))?;
    }
    Ok(())
}

pub struct DeliveryRequestService<B> {
    db: Arc<InMemoryDatabase>,
    bus: B,
    products: Arc<dyn ProductService>,
    shipping_profiles: Arc<dyn ShippingProfileService>,
    history: Arc<DeliveryRequestHistoryService>,
    config: IntakeConfig,
}

impl<B> DeliveryRequestService<B>
where
    B: EventBus<DeliveryRequestEnvelope>,
{
    pub fn new(
        db: Arc<InMemoryDatabase>,
        bus: B,
        products: Arc<dyn ProductService>,
        shipping_profiles: Arc<dyn ShippingProfileService>,
        history: Arc<DeliveryRequestHistoryService>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            db,
            bus,
            products,
            shipping_profiles,
            history,
            config,
        }
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// Run `f` in a transaction and publish what it emitted once committed.
    fn commit<T, F>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&mut Transaction) -> ServiceResult<T>,
    {
        let (value, events) = self.db.transaction(f)?;
        publish_all(&self.bus, events)?;
        Ok(value)
    }

    /// First request matching `selector`, with the relations in `options`.
    ///
    /// Deleted rows are skipped unless the selector filters on status.
    pub fn retrieve(
        &self,
        principal: &Principal,
        selector: &DeliveryRequestFilter,
        options: RetrieveOptions,
    ) -> ServiceResult<DeliveryRequestDetail> {
        self.db.read(|tables| {
            let request = find_request(tables, selector)?;
            authorize(principal, Action::Read, request.store_id)?;
            load_detail(tables, self.products.as_ref(), request, options)
        })?
    }

    /// List-view shape of a root: children filtered by status (default: not
    /// deleted) and product title, each showing only its linked variants.
    pub fn decorate_delivery(
        &self,
        principal: &Principal,
        id: DeliveryRequestId,
        statuses: Option<&[DeliveryStatus]>,
        title: Option<&str>,
    ) -> ServiceResult<DeliveryRequestDetail> {
        let detail = self.retrieve(principal, &DeliveryRequestFilter::by_id(id), RetrieveOptions::full())?;
        Ok(decorate(detail, statuses, title))
    }

    /// Create a request, optionally as a child of `parent_id`.
    ///
    /// A child may stage a product: the product is created hidden, its variants
    /// with no live stock, and each variant is linked with its requested quantity.
    pub fn create(
        &self,
        principal: &Principal,
        data: CreateDeliveryRequest,
        store_id: StoreId,
        parent_id: Option<DeliveryRequestId>,
    ) -> ServiceResult<DeliveryRequestDetail> {
        authorize(principal, Action::Create, store_id)?;
        data.validate()?;

        self.commit(|tx| {
            if let Some(parent_id) = parent_id {
                let parent = live_parent(tx, parent_id)?;
                if parent.store_id != store_id {
                    return Err(ServiceError::not_allowed(format!(
                        "delivery request {parent_id} belongs to another store"
                    )));
                }
            }

            let request = self.create_in(tx, principal.user_id, &data, store_id, parent_id)?;
            tx.emit(DeliveryRequestEvent::created(request.id, Utc::now()));
            load_detail(tx, self.products.as_ref(), request, RetrieveOptions::full())
        })
    }

    /// Create a root plus one child per item, in one transaction.
    ///
    /// All items must target the same store and the same status.
    pub fn create_many(
        &self,
        principal: &Principal,
        items: Vec<NewDeliveryItem>,
    ) -> ServiceResult<DeliveryRequestDetail> {
        let (store_id, status) = validate_batch(&items)?;
        authorize(principal, Action::Create, store_id)?;

        self.commit(|tx| {
            let root_payload = CreateDeliveryRequest {
                status,
                ..Default::default()
            };
            let root = self.create_in(tx, principal.user_id, &root_payload, store_id, None)?;
            let now = Utc::now();
            for item in &items {
                let child = self.create_in(tx, principal.user_id, &item.request, store_id, Some(root.id))?;
                tx.emit(DeliveryRequestEvent::created(child.id, now));
            }
            info!(delivery_request_id = %root.id, store_id = %store_id, children = items.len(), "delivery batch created");
            load_detail(tx, self.products.as_ref(), root, RetrieveOptions::full())
        })
    }

    fn create_in(
        &self,
        tx: &mut Transaction,
        user_id: UserId,
        data: &CreateDeliveryRequest,
        store_id: StoreId,
        parent_id: Option<DeliveryRequestId>,
    ) -> ServiceResult<DeliveryRequest> {
        if parent_id.is_none() && data.product.is_some() {
            return Err(ServiceError::invalid_data("a root delivery request cannot carry a product"));
        }

        let display_id = tx.requests.next_display_id();
        let mut request = tx.requests.insert(data.to_request(
            DeliveryRequestId::new(),
            display_id,
            store_id,
            parent_id,
            Utc::now(),
        ))?;

        if let Some(product) = &data.product {
            let product_id = self.stage_product(tx, user_id, &request, product)?;
            request.product_id = Some(product_id);
            request.total_stock = total_requested(&product.variants)?;
            request = tx.requests.save(request)?;
        }

        info!(
            delivery_request_id = %request.id,
            display_id = request.display_id,
            store_id = %store_id,
            status = %request.status,
            is_parent = request.is_root(),
            "delivery request created"
        );
        Ok(request)
    }

    fn stage_product(
        &self,
        tx: &mut Transaction,
        user_id: UserId,
        request: &DeliveryRequest,
        input: &ProductInput,
    ) -> ServiceResult<ProductId> {
        let profile = self.shipping_profiles.retrieve_default(tx, request.store_id)?;
        let product = self.products.create(
            tx,
            staged_product(input, request.store_id, profile.id),
            user_id,
        )?;

        let price = self.suggested_price(tx, request.store_id, request.suggested_price);
        for variant in &input.variants {
            self.create_staged_variant(tx, request, product.id, variant, price.clone())?;
        }
        Ok(product.id)
    }

    /// New variant with no live stock, linked to `request` with its requested quantity.
    fn create_staged_variant(
        &self,
        tx: &mut Transaction,
        request: &DeliveryRequest,
        product_id: ProductId,
        input: &VariantInput,
        price: Money,
    ) -> ServiceResult<DeliveryRequestVariant> {
        input.requested_quantity()?;
        let variant = self
            .products
            .create_variant(tx, product_id, staged_variant(input, price))?;
        let link = input.link_row(variant.id, request.id)?;
        Ok(tx.request_variants.save(link)?)
    }

    /// Link an existing variant of `product_id` to `request`.
    fn link_existing_variant(
        &self,
        tx: &mut Transaction,
        request: &DeliveryRequest,
        product_id: ProductId,
        input: &VariantInput,
        merge: bool,
    ) -> ServiceResult<DeliveryRequestVariant> {
        let Some(variant_id) = input.id else {
            return Err(ServiceError::invalid_data("variant id is required"));
        };
        let existing = self.products.retrieve_variant(tx, variant_id)?;
        if existing.product_id != product_id {
            return Err(ServiceError::not_found(format!(
                "variant {variant_id} of product {product_id}"
            )));
        }
        if merge {
            self.products
                .update_variant(tx, variant_id, merge_variant(&existing, input))?;
        }
        let link = input.link_row(variant_id, request.id)?;
        Ok(tx.request_variants.save(link)?)
    }

    /// The store's currency, falling back to the configured default.
    fn suggested_price(&self, tables: &Tables, store_id: StoreId, amount: Option<u64>) -> Money {
        let currency = tables
            .stores
            .get(&store_id)
            .and_then(|store| store.default_currency_code.clone())
            .unwrap_or_else(|| self.config.default_currency_code.clone());
        Money::new(amount.unwrap_or(0), currency)
    }

    /// Merge `data` over the request and apply the update rules.
    ///
    /// When the admin marks arrival, linked quantities become live stock in the
    /// same transaction.
    pub fn update(
        &self,
        principal: &Principal,
        id: DeliveryRequestId,
        data: UpdateDeliveryRequest,
    ) -> ServiceResult<DeliveryRequestDetail> {
        self.commit(|tx| {
            let current = find_request(tx, &DeliveryRequestFilter::by_id(id))?;
            authorize(principal, Action::Update, current.store_id)?;
            if data.admin_status.is_some() {
                authorize(principal, Action::ChangeAdminStatus, current.store_id)?;
            }
            self.snapshot_if_admin(tx, principal, &current)?;

            let now = Utc::now();
            let mut outcome = apply_update(&current, &data, now);

            if let Some(product) = &data.product {
                let product_id = current.product_id.ok_or_else(|| {
                    ServiceError::invalid_data(format!("delivery request {id} has no product"))
                })?;
                self.products.update(
                    tx,
                    product_id,
                    product_patch(product, outcome.newly_arrived()),
                    principal.user_id,
                )?;

                if let Some(variants) = &product.variants {
                    if outcome.request.status == DeliveryStatus::Draft
                        && variants.iter().any(VariantInput::has_override)
                    {
                        return Err(ServiceError::invalid_data(
                            "a draft request cannot record a different received quantity",
                        ));
                    }
                    outcome.request.total_stock =
                        self.replace_variants(tx, &outcome.request, product_id, variants)?;
                }
            }

            let mut request = outcome.request.clone();
            if outcome.newly_arrived() && request.inventory_applied_at.is_none() {
                self.apply_inventory(tx, &mut request, now)?;
            }
            let request = tx.requests.save(request)?;

            tx.emit(DeliveryRequestEvent::updated(id, now));
            for event in DeliveryRequestEvent::notifications_for(&outcome, now) {
                tx.emit(event);
            }
            info!(
                delivery_request_id = %id,
                status = %request.status,
                admin_status = ?request.admin_status,
                "delivery request updated"
            );
            load_detail(tx, self.products.as_ref(), request, RetrieveOptions::full())
        })
    }

    /// Recreate the request's variant links from `inputs`.
    ///
    /// Variants missing from `inputs` are removed from the product; existing
    /// ones take the payload's presentation fields but keep their live stock;
    /// new ones are staged at the suggested price. Returns the new total stock.
    fn replace_variants(
        &self,
        tx: &mut Transaction,
        request: &DeliveryRequest,
        product_id: ProductId,
        inputs: &[VariantInput],
    ) -> ServiceResult<u64> {
        let total = total_requested(inputs)?;

        let removed = tx
            .request_variants
            .delete_many(&RequestVariantFilter::for_request(request.id));
        let kept: HashSet<_> = inputs.iter().filter_map(|v| v.id).collect();
        for variant in self.products.list_variants(tx, product_id) {
            if !kept.contains(&variant.id) {
                self.products.delete_variant(tx, variant.id)?;
            }
        }

        let price = self.suggested_price(tx, request.store_id, request.suggested_price);
        for input in inputs {
            match input.id {
                Some(_) => {
                    self.link_existing_variant(tx, request, product_id, input, true)?;
                }
                None => {
                    self.create_staged_variant(tx, request, product_id, input, price.clone())?;
                }
            }
        }
        debug!(delivery_request_id = %request.id, removed, linked = inputs.len(), "variant links replaced");
        Ok(total)
    }

    /// Only a pending child may be cancelled.
    pub fn cancel(&self, principal: &Principal, id: DeliveryRequestId) -> ServiceResult<DeliveryRequest> {
        self.commit(|tx| {
            let mut request = find_request(tx, &DeliveryRequestFilter::by_id(id))?;
            authorize(principal, Action::Cancel, request.store_id)?;
            lifecycle::ensure_cancellable(&request)?;
            self.snapshot_if_admin(tx, principal, &request)?;

            let now = Utc::now();
            lifecycle::cancel(&mut request, now)?;
            let request = tx.requests.save(request)?;

            tx.emit(DeliveryRequestEvent::canceled(id, now));
            if let Some(parent_id) = request.parent_id {
                tx.emit(DeliveryRequestEvent::updated(parent_id, now));
            }
            info!(delivery_request_id = %id, "delivery request cancelled");
            Ok(request)
        })
    }

    /// Soft delete. A root takes all its children with it; a root that never
    /// had children or history is removed outright.
    pub fn delete(
        &self,
        principal: &Principal,
        id: DeliveryRequestId,
        is_parent: bool,
    ) -> ServiceResult<()> {
        self.commit(|tx| {
            let mut request = find_request(tx, &DeliveryRequestFilter::by_id(id))?;
            authorize(principal, Action::Delete, request.store_id)?;
            if request.is_root() != is_parent {
                let shape = if request.is_root() { "a root" } else { "a child" };
                return Err(ServiceError::invalid_data(format!(
                    "delivery request {id} is {shape}, is_parent={is_parent} does not match"
                )));
            }

            let now = Utc::now();
            let children = tx.requests.children_of(id);
            let has_history = !tx
                .history
                .find(&HistoryFilter {
                    delivery_request_id: Some(id),
                })
                .is_empty();

            if is_parent && children.is_empty() && !has_history {
                tx.requests.delete(&id);
                tx.emit(DeliveryRequestEvent::deleted(id, now));
                info!(delivery_request_id = %id, "empty delivery request removed");
                return Ok(());
            }

            self.snapshot_if_admin(tx, principal, &request)?;
            for mut child in children {
                lifecycle::mark_deleted(&mut child, now);
                tx.requests.save(child)?;
            }
            lifecycle::mark_deleted(&mut request, now);
            tx.requests.save(request)?;

            tx.emit(DeliveryRequestEvent::deleted(id, now));
            info!(delivery_request_id = %id, is_parent, "delivery request deleted");
            Ok(())
        })
    }

    /// Restock a product that was already delivered.
    ///
    /// The latest delivered request for the same store and product is the
    /// provenance record: its presentation fields and suggested price are
    /// copied onto a new child of `parent_id`.
    pub fn add_stock(
        &self,
        principal: &Principal,
        data: AddStockInput,
        parent_id: DeliveryRequestId,
    ) -> ServiceResult<DeliveryRequestDetail> {
        if data.status == DeliveryStatus::Draft && data.variants.iter().any(VariantInput::has_override) {
            return Err(ServiceError::invalid_data(
                "a draft request cannot record a different received quantity",
            ));
        }
        total_requested(&data.variants)?;

        self.commit(|tx| {
            let parent = live_parent(tx, parent_id)?;
            authorize(principal, Action::AddStock, parent.store_id)?;

            let provenance = tx
                .requests
                .find(&DeliveryRequestFilter {
                    store_id: Some(parent.store_id),
                    product_id: Some(data.product_id),
                    ..Default::default()
                }
                .with_statuses([DeliveryStatus::Delivered]))
                .into_iter()
                .max_by_key(|r| r.display_id)
                .ok_or_else(|| {
                    ServiceError::not_found(format!(
                        "delivered request for product {} in store {}",
                        data.product_id, parent.store_id
                    ))
                })?;
            self.products.retrieve(tx, data.product_id)?;

            let payload = CreateDeliveryRequest {
                status: data.status,
                rank: data.rank,
                suggested_price: provenance.suggested_price,
                background_type: provenance.background_type.clone(),
                shooting: provenance.shooting.clone(),
                metadata: provenance.metadata.clone(),
                redelivery_flag: true,
                product: None,
            };
            let mut request =
                self.create_in(tx, principal.user_id, &payload, parent.store_id, Some(parent_id))?;

            let price = self.suggested_price(tx, parent.store_id, provenance.suggested_price);
            for input in &data.variants {
                match input.id {
                    Some(_) => {
                        self.link_existing_variant(tx, &request, data.product_id, input, false)?;
                    }
                    None => {
                        self.create_staged_variant(tx, &request, data.product_id, input, price.clone())?;
                    }
                }
            }

            request.product_id = Some(data.product_id);
            request.total_stock = total_requested(&data.variants)?;
            let request = tx.requests.save(request)?;

            tx.emit(DeliveryRequestEvent::created(request.id, Utc::now()));
            info!(
                delivery_request_id = %request.id,
                provenance_id = %provenance.id,
                product_id = %data.product_id,
                "restock requested"
            );
            load_detail(tx, self.products.as_ref(), request, RetrieveOptions::full())
        })
    }

    /// Turn the request's linked quantities into live stock. Admin only.
    ///
    /// `update` does this when the admin status moves into `arrived`. Direct
    /// calls only succeed for an arrived row whose stock was never applied.
    pub fn add_inventory(&self, principal: &Principal, id: DeliveryRequestId) -> ServiceResult<u64> {
        self.commit(|tx| {
            let mut request = find_request(tx, &DeliveryRequestFilter::by_id(id))?;
            authorize(principal, Action::AddInventory, request.store_id)?;
            lifecycle::ensure_inventory_pending(&request)?;

            let added = self.apply_inventory(tx, &mut request, Utc::now())?;
            tx.requests.save(request)?;
            Ok(added)
        })
    }

    fn apply_inventory(
        &self,
        tx: &mut Transaction,
        request: &mut DeliveryRequest,
        now: DateTime<Utc>,
    ) -> ServiceResult<u64> {
        let links = tx
            .request_variants
            .find(&RequestVariantFilter::for_request(request.id));

        let mut added = 0u64;
        for link in links {
            let variant = self.products.retrieve_variant(tx, link.variant_id)?;
            let received = link.received_quantity();
            self.products.update_variant(
                tx,
                variant.id,
                VariantPatch {
                    inventory_quantity: Some(variant.inventory_quantity.saturating_add(received)),
                    ..Default::default()
                },
            )?;
            added += u64::from(received);
        }
        request.inventory_applied_at = Some(now);
        info!(delivery_request_id = %request.id, added, "inventory applied");
        Ok(added)
    }

    /// Halt a child's review. Admin only; `status` is untouched.
    pub fn stop_delivery_request(
        &self,
        principal: &Principal,
        id: DeliveryRequestId,
    ) -> ServiceResult<DeliveryRequest> {
        self.commit(|tx| {
            let mut request = find_request(tx, &DeliveryRequestFilter::by_id(id))?;
            authorize(principal, Action::Stop, request.store_id)?;
            self.snapshot_if_admin(tx, principal, &request)?;

            let now = Utc::now();
            lifecycle::stop(&mut request, now)?;
            let request = tx.requests.save(request)?;
            if let Some(parent_id) = request.parent_id {
                tx.emit(DeliveryRequestEvent::updated(parent_id, now));
            }
            info!(delivery_request_id = %id, "delivery request stopped");
            Ok(request)
        })
    }

    /// Write the operator note, leaving every other field alone.
    pub fn save_note(
        &self,
        principal: &Principal,
        id: DeliveryRequestId,
        note: impl Into<String>,
    ) -> ServiceResult<DeliveryRequest> {
        let note = note.into();
        self.commit(|tx| {
            let mut request = find_request(tx, &DeliveryRequestFilter::by_id(id))?;
            authorize(principal, Action::SaveNote, request.store_id)?;
            request.set_note(note);
            request.updated_at = Utc::now();
            Ok(tx.requests.save(request)?)
        })
    }

    fn snapshot_if_admin(
        &self,
        tx: &mut Transaction,
        principal: &Principal,
        request: &DeliveryRequest,
    ) -> ServiceResult<()> {
        if principal.is_admin() {
            self.history
                .create_snapshot(tx, principal.user_id, request.id, request.is_root())?;
        }
        Ok(())
    }
}

fn find_request(tables: &Tables, selector: &DeliveryRequestFilter) -> ServiceResult<DeliveryRequest> {
    tables
        .requests
        .find_one(selector)
        .ok_or_else(|| ServiceError::not_found(format!("delivery request matching {selector:?}")))
}

fn live_parent(tables: &Tables, parent_id: DeliveryRequestId) -> ServiceResult<DeliveryRequest> {
    let parent = find_request(tables, &DeliveryRequestFilter::by_id(parent_id))?;
    if !parent.is_root() {
        return Err(ServiceError::invalid_data(format!(
            "delivery request {parent_id} is a child and cannot have children"
        )));
    }
    Ok(parent)
}

