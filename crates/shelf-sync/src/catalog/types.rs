//! Catalog API response shapes.
//!
//! Every payload is checked with [`CatalogPayload::validate`] before it is
//! cached or handed out; a response that parses but misses the fields a
//! display needs is treated as malformed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A response body the client trusts only after validation.
pub trait CatalogPayload: Serialize + DeserializeOwned + Send {
    /// Structural check; the error names the offending field.
    fn validate(&self) -> Result<(), String>;
}

/// One product as the catalog describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub sku: String,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Unit price in the catalog's currency.
    #[serde(default)]
    pub price: Option<f64>,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default)]
    pub product_url: Option<String>,

    #[serde(default = "default_available")]
    pub available: bool,

    /// Group id shared by size/colour variants.
    #[serde(default)]
    pub variant_group: Option<String>,
}

fn default_available() -> bool {
    true
}

impl CatalogPayload for CatalogProduct {
    fn validate(&self) -> Result<(), String> {
        if self.sku.trim().is_empty() {
            return Err("product.sku is empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err(format!("product {} has no name", self.sku));
        }
        if let Some(price) = self.price {
            if !price.is_finite() || price < 0.0 {
                return Err(format!("product {} has invalid price {}", self.sku, price));
            }
        }
        Ok(())
    }
}

/// All variants of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantGroup {
    pub group_id: String,

    /// SKU the group was requested for.
    pub sku: String,

    pub variants: Vec<CatalogProduct>,
}

impl CatalogPayload for VariantGroup {
    fn validate(&self) -> Result<(), String> {
        if self.group_id.trim().is_empty() {
            return Err("variantGroup.groupId is empty".to_string());
        }
        if self.variants.is_empty() {
            return Err(format!("variant group {} has no variants", self.group_id));
        }
        self.variants.iter().try_for_each(|p| p.validate())
    }
}

/// One page of the product listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub items: Vec<CatalogProduct>,

    pub page: u32,

    pub page_size: u32,

    pub total: u64,
}

impl CatalogPayload for ProductPage {
    fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page.pageSize is 0".to_string());
        }
        if self.items.len() > self.page_size as usize {
            return Err(format!(
                "page holds {} items but pageSize is {}",
                self.items.len(),
                self.page_size
            ));
        }
        self.items.iter().try_for_each(|p| p.validate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_shape() {
        let product: CatalogProduct =
            serde_json::from_str(r#"{"sku":"SKU001","name":"Trail Shoe","price":89.5}"#).unwrap();
        assert!(product.available);
        assert!(product.validate().is_ok());

        let nameless: CatalogProduct = serde_json::from_str(r#"{"sku":"SKU001","name":" "}"#).unwrap();
        assert!(nameless.validate().is_err());

        let negative = CatalogProduct {
            price: Some(-1.0),
            ..product
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_variant_group_checks_members() {
        let group: VariantGroup = serde_json::from_str(
            r#"{"groupId":"G1","sku":"SKU001","variants":[{"sku":"SKU001","name":"S"},{"sku":"","name":"M"}]}"#,
        )
        .unwrap();
        assert!(group.validate().unwrap_err().contains("sku"));
    }

    #[test]
    fn test_page_bounds() {
        let page = ProductPage {
            items: vec![],
            page: 1,
            page_size: 0,
            total: 0,
        };
        assert!(page.validate().is_err());
    }
}
