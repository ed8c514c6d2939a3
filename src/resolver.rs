use crate::catalog::{Contract, DateRange, DeliveryOrder, sort_contracts};
use crate::logging::log_event;

/// Every contract of `product`, ordered by delivery month.
pub fn contracts_for_product(
    contracts: &[Contract],
    product: i64,
    order: DeliveryOrder,
) -> Vec<Contract> {
    let mut selected: Vec<Contract> = contracts
        .iter()
        .filter(|contract| contract.contrcode == product)
        .cloned()
        .collect();
    sort_contracts(&mut selected, order);
    selected
}

/// Contracts of `product` whose trading lifetime overlaps `range`.
///
/// A contract qualifies when its last trade date is on or after `range.start`
/// and its start date is on or before `range.end`. An empty result is a valid
/// answer, not an error.
pub fn resolve_contracts(
    contracts: &[Contract],
    product: i64,
    range: DateRange,
    order: DeliveryOrder,
) -> Vec<Contract> {
    let mut selected: Vec<Contract> = contracts
        .iter()
        .filter(|contract| contract.contrcode == product && contract.overlaps(&range))
        .cloned()
        .collect();
    sort_contracts(&mut selected, order);

    let message = if selected.is_empty() {
        format!("NO DATA: no contracts for {product} overlap {range}")
    } else {
        format!(
            "Resolved {} contracts for {product} overlapping {range}",
            selected.len()
        )
    };
    log_event(
        file!(),
        "Resolver",
        "resolve_contracts",
        "resolver.contracts",
        line!(),
        &message,
        None,
        Some(product),
    );

    selected
}

/// Futcodes of `contracts`, in the given order.
pub fn futcodes(contracts: &[Contract]) -> Vec<i64> {
    contracts.iter().map(|contract| contract.futcode).collect()
}
