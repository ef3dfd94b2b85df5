//! Contracts of the external catalog services, plus table-backed implementations.
//!
//! Writes take the transaction's tables so catalog changes commit or roll back
//! together with the delivery rows that caused them.

use chrono::Utc;
use tracing::debug;

use intake_catalog::{
    NewProduct, NewVariant, Product, ProductPatch, ProductVariant, ShippingProfile, VariantPatch,
};
use intake_core::{ProductId, ShippingProfileId, StoreId, UserId, VariantId};

use crate::error::{ServiceError, ServiceResult};
use crate::store::Tables;

pub trait ProductService: Send + Sync {
    fn create(&self, tx: &mut Tables, product: NewProduct, created_by: UserId) -> ServiceResult<Product>;

    fn update(
        &self,
        tx: &mut Tables,
        id: ProductId,
        patch: ProductPatch,
        updated_by: UserId,
    ) -> ServiceResult<Product>;

    fn retrieve(&self, tables: &Tables, id: ProductId) -> ServiceResult<Product>;

    fn create_variant(
        &self,
        tx: &mut Tables,
        product_id: ProductId,
        variant: NewVariant,
    ) -> ServiceResult<ProductVariant>;

    fn update_variant(
        &self,
        tx: &mut Tables,
        id: VariantId,
        patch: VariantPatch,
    ) -> ServiceResult<ProductVariant>;

    /// Physically remove a variant from its product.
    fn delete_variant(&self, tx: &mut Tables, id: VariantId) -> ServiceResult<()>;

    fn retrieve_variant(&self, tables: &Tables, id: VariantId) -> ServiceResult<ProductVariant>;

    /// Variants of a product, oldest first.
    fn list_variants(&self, tables: &Tables, product_id: ProductId) -> Vec<ProductVariant>;
}

pub trait ShippingProfileService: Send + Sync {
    /// The store's default shipping profile; `NotFound` when it has none.
    fn retrieve_default(&self, tables: &Tables, store_id: StoreId) -> ServiceResult<ShippingProfile>;
}

/// `ProductService` over the shared in-memory tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableProductService;

impl ProductService for TableProductService {
    fn create(&self, tx: &mut Tables, product: NewProduct, created_by: UserId) -> ServiceResult<Product> {
        if tx.stores.get(&product.store_id).is_none() {
            return Err(ServiceError::not_found(format!("store {}", product.store_id)));
        }
        let product = product.into_product(ProductId::new(), created_by, Utc::now());
        debug!(product_id = %product.id, store_id = %product.store_id, "product created");
        tx.products.upsert(product.clone());
        Ok(product)
    }

    fn update(
        &self,
        tx: &mut Tables,
        id: ProductId,
        patch: ProductPatch,
        updated_by: UserId,
    ) -> ServiceResult<Product> {
        let product = tx
            .products
            .get_mut(&id)
            .ok_or_else(|| ServiceError::not_found(format!("product {id}")))?;
        product.apply_patch(patch, Utc::now());
        debug!(product_id = %id, user_id = %updated_by, "product updated");
        Ok(product.clone())
    }

    fn retrieve(&self, tables: &Tables, id: ProductId) -> ServiceResult<Product> {
        tables
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("product {id}")))
    }

    fn create_variant(
        &self,
        tx: &mut Tables,
        product_id: ProductId,
        variant: NewVariant,
    ) -> ServiceResult<ProductVariant> {
        if tx.products.get(&product_id).is_none() {
            return Err(ServiceError::not_found(format!("product {product_id}")));
        }
        let variant = variant.into_variant(VariantId::new(), product_id, Utc::now());
        tx.variants.upsert(variant.clone());
        Ok(variant)
    }

    fn update_variant(
        &self,
        tx: &mut Tables,
        id: VariantId,
        patch: VariantPatch,
    ) -> ServiceResult<ProductVariant> {
        let variant = tx
            .variants
            .get_mut(&id)
            .ok_or_else(|| ServiceError::not_found(format!("variant {id}")))?;
        variant.apply_patch(patch, Utc::now());
        Ok(variant.clone())
    }

    fn delete_variant(&self, tx: &mut Tables, id: VariantId) -> ServiceResult<()> {
        tx.variants
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found(format!("variant {id}")))
    }

    fn retrieve_variant(&self, tables: &Tables, id: VariantId) -> ServiceResult<ProductVariant> {
        tables
            .variants
            .get(&id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("variant {id}")))
    }

    fn list_variants(&self, tables: &Tables, product_id: ProductId) -> Vec<ProductVariant> {
        let mut variants: Vec<ProductVariant> = tables
            .variants
            .values()
            .filter(|v| v.product_id == product_id)
            .cloned()
            .collect();
        variants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        variants
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TableShippingProfileService;

impl ShippingProfileService for TableShippingProfileService {
    fn retrieve_default(&self, tables: &Tables, store_id: StoreId) -> ServiceResult<ShippingProfile> {
        tables
            .shipping_profiles
            .values()
            .filter(|p| p.store_id == store_id && p.is_default)
            .min_by_key(|p| p.id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("default shipping profile of store {store_id}")))
    }
}

/// Register a store with a default shipping profile. Used by tests and the demo.
pub fn seed_store(tables: &mut Tables, store: intake_catalog::Store) -> ShippingProfileId {
    let profile = ShippingProfile {
        id: ShippingProfileId::new(),
        store_id: store.id,
        name: "Default".to_string(),
        is_default: true,
    };
    let profile_id = profile.id;
    tables.shipping_profiles.upsert(profile);
    tables.stores.upsert(store);
    profile_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_catalog::{ProductStatus, Store, StoreDetail};
    use serde_json::Map;

    fn tables_with_store() -> (Tables, StoreId) {
        let mut tables = Tables::default();
        let store_id = StoreId::new();
        seed_store(
            &mut tables,
            Store {
                id: store_id,
                name: "Atelier".into(),
                owner_id: None,
                default_currency_code: None,
                detail: StoreDetail::default(),
            },
        );
        (tables, store_id)
    }

    fn new_product(store_id: StoreId) -> NewProduct {
        NewProduct {
            store_id,
            title: "Shirt".into(),
            subtitle: None,
            description: None,
            handle: None,
            status: ProductStatus::DeliveryRequest,
            tags: Vec::new(),
            material: None,
            shipping_profile_id: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn default_profile_is_resolved_per_store() {
        let (tables, store_id) = tables_with_store();
        let service = TableShippingProfileService;
        assert!(service.retrieve_default(&tables, store_id).unwrap().is_default);
        assert!(matches!(
            service.retrieve_default(&tables, StoreId::new()),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn variants_belong_to_existing_products() {
        let (mut tables, store_id) = tables_with_store();
        let service = TableProductService;
        let product = service.create(&mut tables, new_product(store_id), UserId::new()).unwrap();

        let variant = NewVariant {
            title: "Default".into(),
            sku: None,
            barcode: None,
            options: Default::default(),
            inventory_quantity: 0,
            prices: Vec::new(),
            weight: None,
        };
        let created = service.create_variant(&mut tables, product.id, variant.clone()).unwrap();
        assert_eq!(service.list_variants(&tables, product.id), vec![created.clone()]);
        assert!(service.create_variant(&mut tables, ProductId::new(), variant).is_err());

        service.delete_variant(&mut tables, created.id).unwrap();
        assert!(service.list_variants(&tables, product.id).is_empty());
    }

    #[test]
    fn products_need_a_known_store() {
        let (mut tables, _) = tables_with_store();
        let result = TableProductService.create(&mut tables, new_product(StoreId::new()), UserId::new());
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }
}
