use anyhow::{Context, Result};

use plate_core::models::NewIngredient;
use plate_core::openfoodfacts::{ProductResponse, product_to_ingredient};
use plate_core::service::BarcodeProvider;

const PRODUCT_URL: &str = "https://world.openfoodfacts.org/api/v0/product";

pub struct OpenFoodFactsClient {
    client: reqwest::Client,
    rt: tokio::runtime::Handle,
}

impl OpenFoodFactsClient {
    pub fn new(rt: tokio::runtime::Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "plate-cli/{} (meal tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, rt })
    }

    pub async fn lookup_barcode_async(&self, barcode: &str) -> Result<Option<NewIngredient>> {
        let url = format!("{PRODUCT_URL}/{barcode}.json");
        tracing::debug!(%url, "openfoodfacts lookup");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach OpenFoodFacts API")?;

        let data: ProductResponse = resp
            .json()
            .await
            .context("Failed to parse OpenFoodFacts barcode response")?;

        if data.status != 1 {
            tracing::debug!(barcode, "product not found");
            return Ok(None);
        }

        Ok(data.product.and_then(product_to_ingredient))
    }
}

impl BarcodeProvider for OpenFoodFactsClient {
    fn lookup_barcode(&self, barcode: &str) -> Result<Option<NewIngredient>> {
        self.rt.block_on(self.lookup_barcode_async(barcode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Integration tests (hit real OpenFoodFacts API) ---

    #[tokio::test]
    #[ignore = "hits OpenFoodFacts API"]
    async fn test_lookup_barcode_known_product() {
        let client = OpenFoodFactsClient::new(tokio::runtime::Handle::current()).unwrap();
        let result = client.lookup_barcode_async("3017620422003").await.unwrap();
        let ingredient = result.expect("Nutella should exist in OpenFoodFacts");
        assert!(ingredient.name.to_lowercase().contains("nutella"));
        assert!(ingredient.calories > 0);
        assert_eq!(ingredient.barcode.as_deref(), Some("3017620422003"));
    }

    #[tokio::test]
    #[ignore = "hits OpenFoodFacts API"]
    async fn test_lookup_barcode_not_found() {
        let client = OpenFoodFactsClient::new(tokio::runtime::Handle::current()).unwrap();
        let result = client.lookup_barcode_async("0000000000000").await.unwrap();
        assert!(result.is_none());
    }
}
