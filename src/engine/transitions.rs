//! Transition tables for every stateful entity.
//!
//! Engine operations and history replay consult these and nothing else.

use crate::models::exception::ExceptionStatus;
use crate::models::history::ActorType;
use crate::models::order::{OrderStatus, StopStatus};
use crate::models::route::RouteStatus;

/// Whether `actor` may move an order from `current` to `requested`.
pub fn can_transition(current: OrderStatus, requested: OrderStatus, actor: ActorType) -> bool {
    use OrderStatus::*;

    matches!(
        (current, requested, actor),
        (Created, Assigned, ActorType::Ops)
            | (Assigned, PickedUp, ActorType::Driver)
            | (PickedUp, InTransit, ActorType::Driver)
            | (InTransit, Delivered, ActorType::Driver)
            | (InTransit, Failed, ActorType::Driver)
            | (Created | Assigned | PickedUp, Cancelled, ActorType::Ops)
    )
}

/// Whether the edge exists for any actor. Used when replaying history.
pub fn is_order_edge(current: OrderStatus, requested: OrderStatus) -> bool {
    [ActorType::Ops, ActorType::Driver, ActorType::System]
        .into_iter()
        .any(|actor| can_transition(current, requested, actor))
}

pub fn can_transition_stop(current: StopStatus, requested: StopStatus) -> bool {
    use StopStatus::*;

    matches!(
        (current, requested),
        (Pending, Arrived) | (Arrived, Completed) | (Pending | Arrived, Skipped)
    )
}

pub fn can_transition_route(current: RouteStatus, requested: RouteStatus) -> bool {
    use RouteStatus::*;

    matches!(
        (current, requested),
        (Planned, InProgress) | (InProgress, Completed) | (Planned | InProgress, Cancelled)
    )
}

pub fn can_transition_exception(current: ExceptionStatus, requested: ExceptionStatus) -> bool {
    use ExceptionStatus::*;

    matches!((current, requested), (Open, Acknowledged) | (Acknowledged, Resolved))
}
