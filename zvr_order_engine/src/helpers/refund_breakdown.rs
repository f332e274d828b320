use crate::{
    db_types::{RefundType, Rupiah},
    errors::EngineError,
};

/// The shipping and item parts of a refund, before the balance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundBreakdown {
    pub shipping_refund: Rupiah,
    pub items_refund: Rupiah,
}

impl RefundBreakdown {
    pub fn refund_amount(&self) -> Rupiah {
        self.shipping_refund + self.items_refund
    }
}

/// What the caller asked for, alongside the order figures the breakdown is derived from.
#[derive(Debug, Clone, Copy)]
pub struct BreakdownRequest {
    pub refund_type: RefundType,
    pub shipping_refund: Option<Rupiah>,
    pub items_refund: Option<Rupiah>,
    /// Sum of the per-item lines, if any were given.
    pub lines_total: Option<Rupiah>,
    pub order_shipping_cost: Rupiah,
    /// Shipping already claimed by the order's other refunds.
    pub shipping_already_refunded: Rupiah,
    /// Order total less every refund that still counts toward it.
    pub outstanding: Rupiah,
}

fn invalid<S: Into<String>>(msg: S) -> EngineError {
    EngineError::ValidationError(msg.into())
}

fn must_match(given: Option<Rupiah>, derived: Rupiah, field: &str) -> Result<(), EngineError> {
    match given {
        Some(v) if v != derived => Err(invalid(format!("{field} of {v} does not match the derived {derived}"))),
        _ => Ok(()),
    }
}

/// Derives the amounts of a refund from its type.
///
/// * FULL refunds whatever is outstanding, unrefunded shipping first.
/// * SHIPPING_ONLY refunds the requested shipping amount, or all the shipping not yet refunded.
/// * ITEM_ONLY refunds the sum of its item lines.
/// * PARTIAL takes both amounts from the caller. Item lines, if given, must add up to `items_refund`.
///
/// The result always has a positive total. Whether it fits within the outstanding balance is checked by the caller.
pub fn derive_breakdown(req: BreakdownRequest) -> Result<RefundBreakdown, EngineError> {
    let remaining_shipping = (req.order_shipping_cost - req.shipping_already_refunded).max(Rupiah::zero());
    let breakdown = match req.refund_type {
        RefundType::Full => {
            if req.lines_total.is_some() {
                return Err(invalid("FULL refunds do not take item lines"));
            }
            let shipping_refund = remaining_shipping.min(req.outstanding);
            let items_refund = req.outstanding - shipping_refund;
            must_match(req.shipping_refund, shipping_refund, "shipping_refund")?;
            must_match(req.items_refund, items_refund, "items_refund")?;
            RefundBreakdown { shipping_refund, items_refund }
        },
        RefundType::ShippingOnly => {
            if req.lines_total.is_some() {
                return Err(invalid("SHIPPING_ONLY refunds do not take item lines"));
            }
            must_match(req.items_refund, Rupiah::zero(), "items_refund")?;
            let shipping_refund = req.shipping_refund.unwrap_or(remaining_shipping);
            RefundBreakdown { shipping_refund, items_refund: Rupiah::zero() }
        },
        RefundType::ItemOnly => {
            let items_refund = req.lines_total.ok_or_else(|| invalid("ITEM_ONLY refunds need at least one item"))?;
            must_match(req.items_refund, items_refund, "items_refund")?;
            must_match(req.shipping_refund, Rupiah::zero(), "shipping_refund")?;
            RefundBreakdown { shipping_refund: Rupiah::zero(), items_refund }
        },
        RefundType::Partial => {
            let shipping_refund = req.shipping_refund.unwrap_or_default();
            let items_refund = req.items_refund.unwrap_or_default();
            if let Some(total) = req.lines_total {
                must_match(Some(items_refund), total, "items_refund")?;
            }
            RefundBreakdown { shipping_refund, items_refund }
        },
    };
    if breakdown.shipping_refund.is_negative() || breakdown.items_refund.is_negative() {
        return Err(invalid("Refund amounts cannot be negative"));
    }
    if breakdown.shipping_refund > remaining_shipping {
        return Err(invalid(format!(
            "shipping_refund of {} exceeds the unrefunded shipping cost of {}",
            breakdown.shipping_refund, remaining_shipping
        )));
    }
    if !breakdown.refund_amount().is_positive() {
        return Err(invalid("The refund amount must be positive"));
    }
    Ok(breakdown)
}

#[cfg(test)]
mod test {
    use super::*;

    fn request(refund_type: RefundType) -> BreakdownRequest {
        BreakdownRequest {
            refund_type,
            shipping_refund: None,
            items_refund: None,
            lines_total: None,
            order_shipping_cost: Rupiah::from(15_000),
            shipping_already_refunded: Rupiah::zero(),
            outstanding: Rupiah::from(115_000),
        }
    }

    #[test]
    fn full_takes_shipping_first() {
        let b = derive_breakdown(request(RefundType::Full)).unwrap();
        assert_eq!(b.shipping_refund, Rupiah::from(15_000));
        assert_eq!(b.items_refund, Rupiah::from(100_000));
        let mut req = request(RefundType::Full);
        req.outstanding = Rupiah::from(10_000);
        let b = derive_breakdown(req).unwrap();
        assert_eq!(b.shipping_refund, Rupiah::from(10_000));
        assert_eq!(b.items_refund, Rupiah::zero());
    }

    #[test]
    fn full_with_nothing_outstanding_is_rejected() {
        let mut req = request(RefundType::Full);
        req.outstanding = Rupiah::zero();
        assert!(matches!(derive_breakdown(req), Err(EngineError::ValidationError(_))));
    }

    #[test]
    fn shipping_only() {
        let b = derive_breakdown(request(RefundType::ShippingOnly)).unwrap();
        assert_eq!(b.refund_amount(), Rupiah::from(15_000));
        let mut req = request(RefundType::ShippingOnly);
        req.shipping_refund = Some(Rupiah::from(20_000));
        assert!(derive_breakdown(req).is_err());
    }

    #[test]
    fn item_only_needs_lines() {
        assert!(derive_breakdown(request(RefundType::ItemOnly)).is_err());
        let mut req = request(RefundType::ItemOnly);
        req.lines_total = Some(Rupiah::from(50_000));
        let b = derive_breakdown(req).unwrap();
        assert_eq!(b.items_refund, Rupiah::from(50_000));
        assert_eq!(b.shipping_refund, Rupiah::zero());
    }

    #[test]
    fn partial_lines_must_add_up() {
        let mut req = request(RefundType::Partial);
        req.items_refund = Some(Rupiah::from(50_000));
        assert_eq!(derive_breakdown(req).unwrap().refund_amount(), Rupiah::from(50_000));
        req.lines_total = Some(Rupiah::from(40_000));
        assert!(derive_breakdown(req).is_err());
        let req = request(RefundType::Partial);
        assert!(derive_breakdown(req).is_err());
    }

    #[test]
    fn shipping_is_refunded_at_most_once() {
        let mut req = request(RefundType::ShippingOnly);
        req.shipping_already_refunded = Rupiah::from(15_000);
        assert!(matches!(derive_breakdown(req), Err(EngineError::ValidationError(_))));
        req.shipping_refund = Some(Rupiah::from(5_000));
        assert!(derive_breakdown(req).is_err());
        req.shipping_already_refunded = Rupiah::from(10_000);
        assert_eq!(derive_breakdown(req).unwrap().shipping_refund, Rupiah::from(5_000));
        req.shipping_refund = None;
        assert_eq!(derive_breakdown(req).unwrap().shipping_refund, Rupiah::from(5_000));

        let mut req = request(RefundType::Full);
        req.shipping_already_refunded = Rupiah::from(15_000);
        req.outstanding = Rupiah::from(100_000);
        let b = derive_breakdown(req).unwrap();
        assert_eq!(b.shipping_refund, Rupiah::zero());
        assert_eq!(b.items_refund, Rupiah::from(100_000));

        let mut req = request(RefundType::Partial);
        req.shipping_already_refunded = Rupiah::from(15_000);
        req.shipping_refund = Some(Rupiah::from(1));
        assert!(derive_breakdown(req).is_err());
    }
}
