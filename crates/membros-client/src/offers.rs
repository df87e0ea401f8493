//! Promotional offer management (admin only).

use membros_gateway::Table;
use membros_shared::models::Offer;
use membros_store::{mappers, Mutation, StoreError};

use crate::client::{Client, Result};

impl Client {
    /// Save an offer: insert when it has no id yet, update otherwise.
    pub async fn save_offer(&self, offer: Offer) -> Result<Offer> {
        self.require_admin()?;
        let row = mappers::offer_to_row(&offer);

        let stored = if offer.id.is_empty() {
            self.cache.apply(Mutation::insert(Table::Offers, row)).await?
        } else {
            self.cache
                .apply(Mutation::update(Table::Offers, offer.id.clone(), row))
                .await?
        }
        .unwrap_or_default();

        Ok(mappers::offer_from_row(&stored).map_err(StoreError::from)?)
    }

    pub async fn delete_offer(&self, id: &str) -> Result<()> {
        self.require_admin()?;
        self.cache.apply(Mutation::delete(Table::Offers, id)).await?;
        Ok(())
    }
}
