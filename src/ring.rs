//! The ring model and the `Analyze` rule set — the coordination core.
//!
//! Everything here is a pure, synchronous function over a snapshot of lease
//! records: no I/O, no locking, no async. Every client runs the same code
//! over the same snapshot, which is what lets assignment converge without a
//! broker or an election.
//!
//! The rules, restated from the data they operate on:
//! - a ring is a sequence of numbers starting at 0 and monotonically
//!   increasing, wrapping from the highest value back to 0
//! - a client holds every value up to, but not including, the next record's
//!   value
//! - if a ring is entirely `Pending`, the lowest-value client approves itself
//! - the previous `Leased` client is responsible for approving the next
//!   `Pending` client
//! - a client leases values by inserting a `Pending` record
//! - a solo client holds the whole ring
//! - balancing is driven by whichever client holds the fewest values, or the
//!   lowest value if nobody holds any yet

use std::collections::BTreeMap;

const BALANCE_THRESHOLD: i64 = 5;

/// Promotion state of a lease record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Leased,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Leased => "LEASED",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Status::Pending),
            "LEASED" => Ok(Status::Leased),
            other => Err(format!("unknown lease status: {other}")),
        }
    }
}

/// One row of the shared lease table, filtered to non-expired records for a
/// single lease name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub name: String,
    pub client_id: String,
    pub value: i64,
    pub status: Status,
}

/// A pending write a client should issue: a self-approval, an approval of a
/// neighbor, or a balance request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub client_id: String,
    pub lease_name: String,
    pub value: i64,
    pub status: Status,
}

/// The result of analyzing one lease name's ring for one client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Report {
    pub values: Vec<i64>,
    pub approvals: Vec<Info>,
    pub balance: Option<Request>,
}

/// Sorted-on-demand lease records for one lease name, interpreted cyclically.
pub type Ring = Vec<Info>;

fn next_lease(ring: &[Info], i: usize) -> &Info {
    if ring.len() <= i + 1 {
        &ring[0]
    } else {
        &ring[i + 1]
    }
}

fn from_to(from: i64, to: i64) -> impl Iterator<Item = i64> {
    from..to
}

/// Maps a ring plus `(client_id, size)` to the slots `client_id` owns, the
/// approvals it must publish, and an optional balance request.
///
/// Total over its inputs: every ring, including an empty one, yields a valid
/// (possibly empty) `Report`.
pub fn analyze(ring: &Ring, client_id: &str, size: i64) -> Report {
    let mut report = Report::default();
    if ring.is_empty() {
        return report;
    }

    let mut sorted = ring.clone();
    sorted.sort_by_key(|info| info.value);

    let mut lease_name = String::new();
    // Flat value lists per client, in ring order. Order matters: balancing
    // indexes into the largest holder's list by position.
    let mut clients: BTreeMap<&str, Vec<i64>> = BTreeMap::new();

    for (i, lease) in sorted.iter().enumerate() {
        let next = next_lease(&sorted, i);
        lease_name = lease.name.clone();

        let mut approvals: Vec<Info> = Vec::new();
        match (lease.status, next.status) {
            (Status::Leased, Status::Pending) => approvals.push(next.clone()),
            (Status::Pending, Status::Pending)
                if lease.value <= next.value && lease.client_id == client_id =>
            {
                approvals.push(lease.clone());
            }
            _ => {}
        }

        let mut values: Vec<i64> = Vec::new();
        if let Status::Leased = lease.status {
            if next.value > lease.value {
                values.extend(from_to(lease.value, next.value));
            } else {
                values.extend(from_to(0, next.value));
                values.extend(from_to(lease.value, size));
            }
        }

        if lease.client_id == client_id {
            report.approvals.extend(approvals);
            report.values.extend(&values);
        }

        clients
            .entry(lease.client_id.as_str())
            .or_default()
            .extend(values);
    }

    if (clients.len() as i64) < size {
        report.balance = analyze_balance(&lease_name, client_id, &clients);
    }

    report.values.sort_unstable();
    report
}

/// Splits the largest holder's range when there is room for another client
/// in the ring, or hands a newcomer one slot taken from the largest holder.
fn analyze_balance(
    lease_name: &str,
    client_id: &str,
    clients: &BTreeMap<&str, Vec<i64>>,
) -> Option<Request> {
    let mut max_client_id = "";
    let mut min_client_id = "";
    let mut max_size = 0i64;
    let mut min_size = i64::MAX;

    for (&id, values) in clients {
        let size = values.len() as i64;
        if size > max_size {
            max_size = size;
            max_client_id = id;
        }
        if size < min_size {
            min_size = size;
            min_client_id = id;
        }
    }

    let size_diff = max_size - min_size;
    let client_in_ring = clients.contains_key(client_id);
    let client_is_behind = min_client_id == client_id && size_diff > BALANCE_THRESHOLD;
    let system_is_started = max_size > 0;

    if system_is_started && (!client_in_ring || client_is_behind) {
        let adjust = if client_in_ring { size_diff / 2 } else { 1 };
        let max_values = clients.get(max_client_id)?;
        let index = (max_size - adjust) as usize;
        let value = *max_values.get(index)?;

        return Some(Request {
            client_id: client_id.to_string(),
            lease_name: lease_name.to_string(),
            value,
            status: Status::Pending,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, client_id: &str, value: i64, status: Status) -> Info {
        Info {
            name: name.to_string(),
            client_id: client_id.to_string(),
            value,
            status,
        }
    }

    // A solo leased client holds the whole ring.
    #[test]
    fn solo_leased_client_holds_everything() {
        let ring = vec![info("my", "a", 1, Status::Leased)];
        let report = analyze(&ring, "a", 4);
        assert_eq!(report.values, vec![0, 1, 2, 3]);
        assert!(report.approvals.is_empty());
        assert!(report.balance.is_none());
    }

    // A solo pending client must approve itself.
    #[test]
    fn solo_pending_client_self_approves() {
        let ring = vec![info("my", "a", 1, Status::Pending)];
        let report = analyze(&ring, "a", 4);
        assert!(report.values.is_empty());
        assert_eq!(report.approvals, vec![info("my", "a", 1, Status::Pending)]);
    }

    // A leased predecessor approves its pending successor.
    #[test]
    fn leased_predecessor_approves_pending_successor() {
        let ring = vec![
            info("my", "a", 0, Status::Leased),
            info("my", "b", 2, Status::Pending),
        ];
        let report = analyze(&ring, "a", 4);
        assert_eq!(report.approvals, vec![info("my", "b", 2, Status::Pending)]);
        assert_eq!(report.values, vec![0, 1]);
    }

    // Two leased clients split the ring with no wrap.
    #[test]
    fn two_leased_clients_split_the_ring() {
        let ring = vec![
            info("my", "a", 0, Status::Leased),
            info("my", "b", 2, Status::Leased),
        ];
        let a = analyze(&ring, "a", 4);
        assert_eq!(a.values, vec![0, 1]);
        let b = analyze(&ring, "b", 4);
        assert_eq!(b.values, vec![2, 3]);
    }

    // The last record in ring order wraps to claim the low end.
    #[test]
    fn last_record_wraps_around_to_zero() {
        let ring = vec![
            info("my", "a", 0, Status::Leased),
            info("my", "b", 2, Status::Leased),
        ];
        let b = analyze(&ring, "b", 4);
        assert_eq!(b.values, vec![2, 3]);
        let a = analyze(&ring, "a", 4);
        assert_eq!(a.values, vec![0, 1]);
    }

    // A newcomer with no records yet requests one slot from the only holder.
    #[test]
    fn newcomer_requests_a_slot_from_the_sole_holder() {
        let ring = vec![info("my", "a", 0, Status::Leased)];
        let report = analyze(&ring, "b", 4);
        let balance = report.balance.expect("expected a balance request");
        assert_eq!(balance.client_id, "b");
        assert_eq!(balance.status, Status::Pending);
    }

    // An already-present but starved client requests half the size
    // difference once it exceeds the balance threshold.
    #[test]
    fn starved_client_requests_half_the_difference() {
        let ring = vec![
            info("my", "a", 0, Status::Leased),
            info("my", "b", 19, Status::Leased),
        ];
        let report = analyze(&ring, "b", 20);
        let balance = report.balance.expect("expected a balance request");
        assert_eq!(balance.client_id, "b");
    }

    // A client within the balance threshold of the largest holder does not
    // request anything.
    #[test]
    fn client_within_threshold_does_not_balance() {
        let ring = vec![
            info("my", "a", 0, Status::Leased),
            info("my", "b", 9, Status::Leased),
        ];
        let report = analyze(&ring, "b", 10);
        assert!(report.balance.is_none());
    }

    // The eight reference scenarios from the spec, pinned against their
    // exact (ring, clientID, size) -> Report tuples rather than renamed
    // stand-ins. `info`'s argument order is `(name, client_id, value,
    // status)`; the tuples below read `{client_id, name, value, status}`, so
    // the name/client_id positions are swapped relative to how they're
    // written out here.

    #[test]
    fn spec_scenario_1_solo_leased_holds_the_whole_range() {
        let ring = vec![info("a", "my", 1, Status::Leased)];
        let report = analyze(&ring, "my", 4);
        assert_eq!(report.values, vec![0, 1, 2, 3]);
        assert!(report.approvals.is_empty());
        assert!(report.balance.is_none());
    }

    #[test]
    fn spec_scenario_2_solo_pending_self_approves() {
        let ring = vec![info("a", "my", 1, Status::Pending)];
        let report = analyze(&ring, "my", 4);
        assert!(report.values.is_empty());
        assert_eq!(report.approvals, vec![info("a", "my", 1, Status::Pending)]);
        assert!(report.balance.is_none());
    }

    #[test]
    fn spec_scenario_3_two_leased_no_wrap_no_balance() {
        let ring = vec![
            info("a", "my", 2, Status::Leased),
            info("a", "c1", 4, Status::Leased),
        ];
        let report = analyze(&ring, "my", 5);
        assert_eq!(report.values, vec![2, 3]);
        assert!(report.approvals.is_empty());
        assert!(report.balance.is_none());
    }

    #[test]
    fn spec_scenario_4_leased_predecessor_approves_pending_successor() {
        let ring = vec![
            info("a", "my", 2, Status::Leased),
            info("a", "c1", 4, Status::Pending),
        ];
        let report = analyze(&ring, "my", 5);
        assert_eq!(report.values, vec![2, 3]);
        assert_eq!(report.approvals, vec![info("a", "c1", 4, Status::Pending)]);
    }

    #[test]
    fn spec_scenario_5_wraps_to_claim_the_low_end() {
        let ring = vec![
            info("a", "c1", 2, Status::Leased),
            info("a", "my", 4, Status::Leased),
        ];
        let report = analyze(&ring, "my", 5);
        assert_eq!(report.values, vec![0, 1, 4]);
    }

    #[test]
    fn spec_scenario_6_behind_client_requests_half_the_gap() {
        let ring = vec![
            info("a", "c1", 5, Status::Leased),
            info("a", "my", 13, Status::Leased),
            info("a", "c2", 15, Status::Leased),
        ];
        let report = analyze(&ring, "my", 100);
        let balance = report.balance.expect("expected a balance request");
        assert_eq!(
            balance,
            Request {
                client_id: "my".to_string(),
                lease_name: "a".to_string(),
                value: 56,
                status: Status::Pending,
            }
        );
    }

    #[test]
    fn spec_scenario_7_newcomer_takes_the_largest_holders_last_slot() {
        let ring = vec![
            info("a", "c1", 0, Status::Leased),
            info("a", "c2", 1, Status::Leased),
        ];
        let report = analyze(&ring, "my", 10);
        let balance = report.balance.expect("expected a balance request");
        assert_eq!(
            balance,
            Request {
                client_id: "my".to_string(),
                lease_name: "a".to_string(),
                value: 9,
                status: Status::Pending,
            }
        );
    }

    #[test]
    fn spec_scenario_8_no_leased_records_means_no_balance() {
        let ring = vec![info("a", "c1", 0, Status::Pending)];
        let report = analyze(&ring, "my", 10);
        assert!(report.balance.is_none());
    }

    #[test]
    fn empty_ring_yields_empty_report() {
        let ring: Ring = vec![];
        let report = analyze(&ring, "a", 4);
        assert_eq!(report, Report::default());
    }

    use proptest::prelude::*;
    use std::collections::BTreeSet;

    /// An all-`Leased` ring: a size, and a subset of its values each
    /// assigned to one of a handful of client ids.
    fn arb_leased_ring() -> impl Strategy<Value = (Ring, i64)> {
        (2usize..20).prop_flat_map(|size| {
            prop::collection::btree_set(0i64..size as i64, 1..=size).prop_flat_map(
                move |values| {
                    let values: Vec<i64> = values.into_iter().collect();
                    let n = values.len();
                    prop::collection::vec(0usize..4, n).prop_map(move |client_idxs| {
                        let ring: Ring = values
                            .iter()
                            .zip(client_idxs.iter())
                            .map(|(&v, &c)| info("lease", &format!("c{c}"), v, Status::Leased))
                            .collect();
                        (ring, size as i64)
                    })
                },
            )
        })
    }

    proptest! {
        #[test]
        fn values_are_sorted_and_deduplicated((ring, size) in arb_leased_ring()) {
            let client_ids: BTreeSet<String> = ring.iter().map(|r| r.client_id.clone()).collect();
            for client_id in &client_ids {
                let report = analyze(&ring, client_id, size);
                let mut sorted = report.values.clone();
                sorted.sort_unstable();
                sorted.dedup();
                prop_assert_eq!(report.values, sorted);
            }
        }

        #[test]
        fn leased_ring_partitions_the_full_range((ring, size) in arb_leased_ring()) {
            let client_ids: BTreeSet<String> = ring.iter().map(|r| r.client_id.clone()).collect();
            let mut union: Vec<i64> = Vec::new();
            for client_id in &client_ids {
                let report = analyze(&ring, client_id, size);
                for v in &report.values {
                    prop_assert!(!union.contains(v), "value {} claimed by more than one client", v);
                }
                union.extend(report.values);
            }
            union.sort_unstable();
            let expected: Vec<i64> = (0..size).collect();
            prop_assert_eq!(union, expected);
        }

        #[test]
        fn analyze_is_idempotent_on_its_own_fixed_point((ring, size) in arb_leased_ring()) {
            let client_ids: BTreeSet<String> = ring.iter().map(|r| r.client_id.clone()).collect();
            for client_id in &client_ids {
                let first = analyze(&ring, client_id, size);
                let second = analyze(&ring, client_id, size);
                prop_assert_eq!(first, second);
            }
        }
    }
}
