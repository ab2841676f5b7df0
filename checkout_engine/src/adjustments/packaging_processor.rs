//! Reusable packaging deposits.
//!
//! Restaurants in the deposit scheme hand out reusable boxes. Each box costs the customer a refundable deposit, charged
//! as an item-level `ReusablePackaging` adjustment. Boxes the customer brings back are credited as a single order-level
//! `GiveBack` adjustment, which never exceeds the deposits charged on the same order.
use log::*;
use thiserror::Error;

use crate::{
    db_types::{Adjustment, AdjustmentType, Money, Order, OrderError, OrderId},
    traits::{AdjustmentLabeler, CollaboratorError, LabelParams, PackagingLedger},
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdjustmentError {
    #[error("{0}")]
    Order(#[from] OrderError),
    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),
    #[error("Order {id} total is {total}, but its items and adjustments add up to {expected}")]
    Inconsistent { id: OrderId, total: Money, expected: Money },
    #[error("The packaging deposits of order {0} are too large to charge")]
    DepositOverflow(OrderId),
}

/// Checks that the order total is exactly its items plus its adjustments.
pub fn verify_totals(order: &Order) -> Result<(), AdjustmentError> {
    if order.is_consistent() {
        Ok(())
    } else {
        let expected = order.items_total() + order.adjustments_total();
        error!("♻️ Order {} total {} does not reconcile with {expected}", order.id, order.total);
        Err(AdjustmentError::Inconsistent { id: order.id, total: order.total, expected })
    }
}

pub struct PackagingAdjustmentProcessor<L> {
    ledger: L,
    labeler: Box<dyn AdjustmentLabeler + Send + Sync>,
    deposit_unit_price: Money,
}

impl<L: PackagingLedger> PackagingAdjustmentProcessor<L> {
    pub fn new(ledger: L, labeler: Box<dyn AdjustmentLabeler + Send + Sync>, deposit_unit_price: Money) -> Self {
        Self { ledger, labeler, deposit_unit_price }
    }

    pub fn deposit_unit_price(&self) -> Money {
        self.deposit_unit_price
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Rebuilds the packaging adjustments of `order` from scratch.
    ///
    /// Running this twice on an unchanged order produces the same adjustments. The ledger is only consulted when the
    /// order actually charges deposits.
    pub async fn process(&self, order: &mut Order) -> Result<(), AdjustmentError> {
        order.remove_adjustments(AdjustmentType::ReusablePackaging)?;
        order.remove_adjustments(AdjustmentType::GiveBack)?;
        if !self.applies_to(order) {
            trace!("♻️ Order {} does not take part in the deposit scheme", order.id);
            return verify_totals(order);
        }

        let mut deposits = Vec::new();
        for item in order.items.iter().filter(|i| i.reusable_packaging_enabled) {
            // Partly filled containers are charged as whole ones
            let units = item.deposit_units().ceil();
            #[allow(clippy::cast_possible_truncation)]
            let amount = self
                .deposit_unit_price
                .checked_mul(units as i64)
                .ok_or(AdjustmentError::DepositOverflow(order.id))?;
            if amount.is_positive() {
                let params = LabelParams::default().units(units).amount(amount).variant(&item.variant_code);
                let label = self.labeler.label(AdjustmentType::ReusablePackaging, &params);
                deposits.push(Adjustment::for_item(item.id, AdjustmentType::ReusablePackaging, amount, label));
            }
        }
        let deposit_total = deposits
            .iter()
            .try_fold(Money::ZERO, |total, a| total.checked_add(a.amount))
            .ok_or(AdjustmentError::DepositOverflow(order.id))?;
        for adjustment in deposits {
            order.add_adjustment(adjustment)?;
        }
        debug!("♻️ Order {} charges {deposit_total} in packaging deposits", order.id);

        if deposit_total.is_positive() {
            let returnable = self.ledger.units_returnable(&order.customer_id, order.id).await?;
            if returnable > 0 {
                let credit =
                    self.deposit_unit_price.checked_mul(returnable).map_or(deposit_total, |c| c.min(deposit_total));
                #[allow(clippy::cast_precision_loss)]
                let params = LabelParams::default().units(returnable as f64).amount(credit);
                let label = self.labeler.label(AdjustmentType::GiveBack, &params);
                order.add_adjustment(Adjustment::for_order(AdjustmentType::GiveBack, -credit, label))?;
                debug!("♻️ Order {} credits {credit} for {returnable} returned units", order.id);
            }
        }

        order.recalculate_total();
        verify_totals(order)
    }

    fn applies_to(&self, order: &Order) -> bool {
        order.reusable_packaging_enabled && order.restaurant.as_ref().is_some_and(|r| r.deposit_refund_enabled)
    }
}
