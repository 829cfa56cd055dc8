//! Log lines tracing a request through the hops, indented by hop number.
use std::time::Duration;

use netctx_core::RequestContext;
use rand::Rng;
use time::{OffsetDateTime, macros::format_description};
use tracing::info;

use crate::proto::DeadlineResponse;

pub fn print_start(todo: i32, timeout: i32) {
    let at = OffsetDateTime::now_utc() + time::Duration::seconds(i64::from(timeout));
    let at = at
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "?".into());
    info!("starting {todo} hops with deadline set to {at}");
}

pub fn print_hop(hops: i32) {
    info!("{}calling other service", prefix(hops));
}

pub fn print_response(hops: i32, resp: &DeadlineResponse) {
    info!("{}response with {} hops", prefix(hops), resp.hops);
}

pub fn print_done(ctx: &RequestContext, hops: i32) {
    let left = ctx.remaining().unwrap_or_default().as_secs_f64();
    info!("{}done with {left:.3} seconds left", prefix(hops));
}

pub fn print_deadline_reached(hops: i32) {
    info!("{}deadline reached", prefix(hops));
}

/// Pause before each hop: 250 or 500 ms.
pub fn random_delay() -> Duration {
    let steps: u64 = rand::thread_rng().gen_range(1..=2);
    Duration::from_millis(steps * 250)
}

fn prefix(hops: i32) -> String {
    let indent = " ".repeat(usize::try_from(hops).unwrap_or(0));
    format!("{indent}{hops}: ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_indents_by_hop() {
        assert_eq!(prefix(0), "0: ");
        assert_eq!(prefix(3), "   3: ");
        assert_eq!(prefix(-1), "-1: ");
    }

    #[test]
    fn delay_is_one_of_two_steps() {
        for _ in 0..32 {
            let d = random_delay();
            assert!(d == Duration::from_millis(250) || d == Duration::from_millis(500), "{d:?}");
        }
    }
}
