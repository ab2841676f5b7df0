use gateway_tools::{FormParams, ProcessorApiError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{db_types::Money, traits::FeeMode};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Fee total {fee_total} must lie between zero and the order total {total}")]
pub struct InvalidFeeSplit {
    pub total: Money,
    pub fee_total: Money,
}

/// How the money of one payment is divided between the marketplace and the restaurant.
///
/// | Restaurant account | Fee mode           | Split                                                       |
/// |--------------------|--------------------|-------------------------------------------------------------|
/// | none               | any                | `MarketplaceRetainsAll`                                     |
/// | `acct`             | RestaurantPaysFee  | `Direct`: charge on `acct`, marketplace keeps `fee_total`    |
/// | `acct`             | MarketplacePaysFee | `Destination`: charge on marketplace, `total - fee_total` to `acct` |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeSplit {
    MarketplaceRetainsAll,
    Direct { account: String, application_fee: Money },
    Destination { account: String, transfer: Money },
}

impl FeeSplit {
    pub fn compute(
        total: Money,
        fee_total: Money,
        fee_mode: FeeMode,
        merchant_account: Option<&str>,
    ) -> Result<Self, InvalidFeeSplit> {
        if fee_total.is_negative() || fee_total > total {
            return Err(InvalidFeeSplit { total, fee_total });
        }
        let Some(account) = merchant_account else {
            return Ok(Self::MarketplaceRetainsAll);
        };
        let split = match fee_mode {
            FeeMode::RestaurantPaysFee => Self::Direct { account: account.to_string(), application_fee: fee_total },
            FeeMode::MarketplacePaysFee => Self::Destination { account: account.to_string(), transfer: total - fee_total },
        };
        Ok(split)
    }

    /// The connected account that later calls for this payment must be issued against. Only direct charges live on
    /// the restaurant's account.
    pub fn merchant_account(&self) -> Option<&str> {
        match self {
            Self::Direct { account, .. } => Some(account.as_str()),
            _ => None,
        }
    }

    /// What the marketplace keeps out of `total`, before processor fees.
    pub fn marketplace_share(&self, total: Money) -> Money {
        match self {
            Self::MarketplaceRetainsAll => total,
            Self::Direct { application_fee, .. } => *application_fee,
            Self::Destination { transfer, .. } => total - *transfer,
        }
    }

    /// Adds the split parameters to a payment intent or charge creation request.
    pub fn apply(&self, params: FormParams) -> Result<FormParams, ProcessorApiError> {
        match self {
            Self::MarketplaceRetainsAll => Ok(params),
            Self::Direct { application_fee, .. } => params.push_amount("application_fee_amount", *application_fee),
            Self::Destination { account, transfer } => {
                params.push_nested("transfer_data", "destination", account).push_amount("transfer_data[amount]", *transfer)
            },
        }
    }
}
