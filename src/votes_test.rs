use super::*;

#[test]
fn new_aggregator_is_empty() {
    let votes = VoteAggregator::new();
    assert!(votes.is_empty());
    assert_eq!(votes.len(), 0);
    assert_eq!(votes.get(1), None);
}

#[test]
fn last_upsert_for_a_user_wins() {
    let mut votes = VoteAggregator::new();
    for value in [1, 8, 3, 5] {
        votes.upsert(7, value);
    }
    assert_eq!(votes.len(), 1);
    assert_eq!(votes.all().get(&7), Some(&5));
}

#[test]
fn upsert_returns_replaced_value() {
    let mut votes = VoteAggregator::new();
    assert_eq!(votes.upsert(1, 3), None);
    assert_eq!(votes.upsert(1, 5), Some(3));
}

#[test]
fn repeating_the_same_vote_is_idempotent() {
    let mut once = VoteAggregator::new();
    once.upsert(2, 13);

    let mut twice = VoteAggregator::new();
    twice.upsert(2, 13);
    twice.upsert(2, 13);

    assert_eq!(once, twice);
}

#[test]
fn remove_and_clear() {
    let mut votes = VoteAggregator::new();
    votes.upsert(1, 1);
    votes.upsert(2, 2);
    assert_eq!(votes.remove(1), Some(1));
    assert_eq!(votes.remove(1), None);
    assert_eq!(votes.len(), 1);
    votes.clear();
    assert!(votes.is_empty());
}

#[test]
fn all_is_ordered_by_user_id() {
    let mut votes = VoteAggregator::new();
    votes.upsert(9, 1);
    votes.upsert(3, 2);
    votes.upsert(5, 3);
    let ids: Vec<_> = votes.all().keys().copied().collect();
    assert_eq!(ids, vec![3, 5, 9]);
}
