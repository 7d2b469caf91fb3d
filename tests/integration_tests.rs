// Integration tests for the matching engine over the repository ports

use matchbot_core::models::{
    Gender, GenderPreference, Interaction, InteractionType, MatchPage, MatchStatus, Profile,
    ProfileStatus, ScoringConfig,
};
use matchbot_core::services::{FailPoint, InMemoryRepository, RepositoryError};
use matchbot_core::{MatchError, Matcher};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn create_test_profile(
    id: &str,
    gender: Gender,
    preference: GenderPreference,
    age: u8,
    lat: f64,
    lon: f64,
) -> Profile {
    Profile {
        user_id: id.to_string(),
        gender: Some(gender),
        preference_gender: Some(preference),
        age: Some(age),
        latitude: Some(lat),
        longitude: Some(lon),
        status: ProfileStatus::Active,
    }
}

/// Alice, Bob and Carol with no prior interactions
async fn seeded_repository() -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.upsert_profile(create_test_profile("alice", Gender::Female, GenderPreference::Male, 25, 0.0, 0.0))
        .await;
    repo.upsert_profile(create_test_profile("bob", Gender::Male, GenderPreference::Female, 28, 0.1, 0.1))
        .await;
    repo.upsert_profile(create_test_profile("carol", Gender::Female, GenderPreference::Female, 27, 1.0, 1.0))
        .await;
    repo
}

fn matcher_for(repo: &InMemoryRepository) -> Matcher<InMemoryRepository> {
    Matcher::with_default_config(Arc::new(repo.clone()))
}

fn ids(ranked: &[matchbot_core::ScoredCandidate]) -> Vec<&str> {
    ranked.iter().map(|c| c.profile.user_id.as_str()).collect()
}

#[tokio::test]
async fn test_rank_candidates_end_to_end() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    let ranked = assert_ok!(matcher.rank_candidates("alice").await);
    assert_eq!(ids(&ranked), vec!["bob"]);
    assert!(ranked[0].distance_km.unwrap() > 15.0);
}

#[tokio::test]
async fn test_liked_candidate_is_excluded() {
    let repo = seeded_repository().await;
    assert_ok!(repo.record_interaction(Interaction::new("alice", "bob", InteractionType::Like)).await);

    let ranked = assert_ok!(matcher_for(&repo).rank_candidates("alice").await);
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn test_reported_candidate_still_ranks() {
    let repo = seeded_repository().await;
    assert_ok!(repo.record_interaction(Interaction::report("alice", "bob", "rude")).await);

    let ranked = assert_ok!(matcher_for(&repo).rank_candidates("alice").await);
    assert_eq!(ids(&ranked), vec!["bob"]);
}

#[tokio::test]
async fn test_interactions_by_others_do_not_exclude() {
    let repo = seeded_repository().await;
    assert_ok!(repo.record_interaction(Interaction::new("bob", "alice", InteractionType::Dislike)).await);

    let ranked = assert_ok!(matcher_for(&repo).rank_candidates("alice").await);
    assert_eq!(ids(&ranked), vec!["bob"]);
}

#[tokio::test]
async fn test_unready_seeker_gets_nothing() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    assert!(assert_ok!(matcher.rank_candidates("nobody").await).is_empty());

    let mut alice = create_test_profile("alice", Gender::Female, GenderPreference::Male, 25, 0.0, 0.0);
    alice.status = ProfileStatus::Inactive;
    repo.upsert_profile(alice.clone()).await;
    assert!(assert_ok!(matcher.rank_candidates("alice").await).is_empty());

    alice.status = ProfileStatus::Active;
    alice.latitude = None;
    repo.upsert_profile(alice).await;
    assert!(assert_ok!(matcher.rank_candidates("alice").await).is_empty());
}

#[tokio::test]
async fn test_incomplete_candidate_is_skipped() {
    let repo = seeded_repository().await;
    let mut dan = create_test_profile("dan", Gender::Male, GenderPreference::Female, 26, 0.0, 0.0);
    dan.age = None;
    repo.upsert_profile(dan).await;

    let ranked = assert_ok!(matcher_for(&repo).rank_candidates("alice").await);
    assert_eq!(ids(&ranked), vec!["bob"]);
}

#[tokio::test]
async fn test_at_most_five_sorted_and_stable() {
    let repo = seeded_repository().await;
    for i in 0..9 {
        let offset = 0.01 * (i + 1) as f64;
        repo.upsert_profile(create_test_profile(
            &format!("m{}", i),
            Gender::Male,
            GenderPreference::Both,
            25 + i as u8,
            offset,
            offset,
        ))
        .await;
    }
    let matcher = matcher_for(&repo);

    let first = assert_ok!(matcher.rank_candidates("alice").await);
    let second = assert_ok!(matcher.rank_candidates("alice").await);

    assert_eq!(first.len(), 5);
    assert!(first.windows(2).all(|w| w[0].score <= w[1].score));
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn test_custom_result_limit() {
    let repo = seeded_repository().await;
    repo.upsert_profile(create_test_profile("dan", Gender::Male, GenderPreference::Both, 30, 0.5, 0.5))
        .await;
    let config = ScoringConfig {
        max_results: 1,
        ..ScoringConfig::default()
    };
    let matcher = Matcher::new(Arc::new(repo.clone()), config);

    let ranked = assert_ok!(matcher.rank_candidates("alice").await);
    assert_eq!(ids(&ranked), vec!["bob"]);
}

#[tokio::test]
async fn test_repository_failure_propagates() {
    let repo = seeded_repository().await;
    repo.fail_on(FailPoint::FetchCandidates);

    let result = matcher_for(&repo).rank_candidates("alice").await;
    assert!(matches!(
        result,
        Err(MatchError::Repository(RepositoryError::Unavailable(_)))
    ));
}

#[tokio::test]
async fn test_reciprocal_acceptance_creates_mutual_match() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    let first = assert_ok!(matcher.advance_match("alice", "bob", MatchStatus::Accepted).await);
    assert_eq!(first.status, MatchStatus::Accepted);
    assert!(repo.conversations().await.is_empty());

    let second = assert_ok!(matcher.advance_match("bob", "alice", MatchStatus::Accepted).await);
    assert_eq!(second.status, MatchStatus::Mutual);

    assert_eq!(repo.get_match("alice", "bob").await.unwrap().status, MatchStatus::Mutual);
    assert_eq!(repo.get_match("bob", "alice").await.unwrap().status, MatchStatus::Mutual);

    let conversations = repo.conversations().await;
    assert_eq!(conversations.len(), 1);
    assert!(conversations[0].links("alice", "bob"));

    let found = assert_ok!(matcher.conversation_between("bob", "alice").await);
    assert_eq!(found.map(|c| c.id), Some(conversations[0].id));
    assert_eq!(assert_ok!(matcher.mutual_partners("alice").await), vec!["bob".to_string()]);
    assert_eq!(assert_ok!(matcher.mutual_partners("bob").await), vec!["alice".to_string()]);
}

#[tokio::test]
async fn test_pending_then_accept_reaches_mutual() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    assert_ok!(matcher.advance_match("alice", "bob", MatchStatus::Pending).await);
    assert_ok!(matcher.advance_match("bob", "alice", MatchStatus::Accepted).await);
    let promoted = assert_ok!(matcher.advance_match("alice", "bob", MatchStatus::Accepted).await);

    assert_eq!(promoted.status, MatchStatus::Mutual);
    assert_eq!(repo.conversations().await.len(), 1);
}

#[tokio::test]
async fn test_repeated_acceptance_is_refused() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    assert_ok!(matcher.advance_match("alice", "bob", MatchStatus::Accepted).await);
    assert_ok!(matcher.advance_match("bob", "alice", MatchStatus::Accepted).await);

    let again = matcher.advance_match("bob", "alice", MatchStatus::Accepted).await;
    assert!(matches!(
        again,
        Err(MatchError::InvalidTransition {
            from: MatchStatus::Mutual,
            to: MatchStatus::Accepted
        })
    ));
    assert_eq!(repo.conversations().await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_acceptance_yields_one_conversation() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    let a = {
        let matcher = matcher.clone();
        tokio::spawn(async move { matcher.advance_match("alice", "bob", MatchStatus::Accepted).await })
    };
    let b = {
        let matcher = matcher.clone();
        tokio::spawn(async move { matcher.advance_match("bob", "alice", MatchStatus::Accepted).await })
    };

    let a = a.await.unwrap();
    let b = b.await.unwrap();
    assert_ok!(&a);
    assert_ok!(&b);

    assert_eq!(repo.get_match("alice", "bob").await.unwrap().status, MatchStatus::Mutual);
    assert_eq!(repo.get_match("bob", "alice").await.unwrap().status, MatchStatus::Mutual);
    assert_eq!(repo.conversations().await.len(), 1);
}

#[tokio::test]
async fn test_failed_conversation_insert_rolls_back_everything() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    assert_ok!(matcher.advance_match("alice", "bob", MatchStatus::Accepted).await);
    repo.fail_on(FailPoint::InsertConversation);

    let result = matcher.advance_match("bob", "alice", MatchStatus::Accepted).await;
    assert!(matches!(result, Err(MatchError::MutualMatchAborted(_))));

    assert_eq!(repo.get_match("alice", "bob").await.unwrap().status, MatchStatus::Accepted);
    assert!(repo.get_match("bob", "alice").await.is_none());
    assert!(repo.conversations().await.is_empty());

    // The pair can still complete once the store recovers
    repo.clear_failures();
    let retried = assert_ok!(matcher.advance_match("bob", "alice", MatchStatus::Accepted).await);
    assert_eq!(retried.status, MatchStatus::Mutual);
    assert_eq!(repo.conversations().await.len(), 1);
}

#[tokio::test]
async fn test_failed_commit_aborts_mutual_match() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    assert_ok!(matcher.advance_match("alice", "bob", MatchStatus::Accepted).await);
    repo.fail_on(FailPoint::Commit);

    assert_err!(matcher.advance_match("bob", "alice", MatchStatus::Accepted).await);
    repo.clear_failures();

    assert_eq!(repo.get_match("alice", "bob").await.unwrap().status, MatchStatus::Accepted);
    assert!(repo.conversations().await.is_empty());
}

#[tokio::test]
async fn test_illegal_transition_leaves_record_unchanged() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    assert_ok!(matcher.advance_match("alice", "bob", MatchStatus::Rejected).await);

    let result = matcher.advance_match("alice", "bob", MatchStatus::Completed).await;
    assert!(matches!(
        result,
        Err(MatchError::InvalidTransition {
            from: MatchStatus::Rejected,
            to: MatchStatus::Completed
        })
    ));
    assert_eq!(repo.get_match("alice", "bob").await.unwrap().status, MatchStatus::Rejected);

    // Rejected can still be reconsidered
    let reconsidered = assert_ok!(matcher.advance_match("alice", "bob", MatchStatus::Accepted).await);
    assert_eq!(reconsidered.status, MatchStatus::Accepted);
}

#[tokio::test]
async fn test_invalid_requests_are_refused() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    assert!(matches!(
        matcher.advance_match("alice", "alice", MatchStatus::Pending).await,
        Err(MatchError::InvalidRequest(_))
    ));
    assert!(matches!(
        matcher.advance_match("alice", "bob", MatchStatus::Mutual).await,
        Err(MatchError::ReservedStatus(MatchStatus::Mutual))
    ));
    assert!(matches!(
        matcher.advance_match("alice", "bob", MatchStatus::Ended).await,
        Err(MatchError::InvalidInitialStatus(MatchStatus::Ended))
    ));
    assert!(repo.get_match("alice", "bob").await.is_none());
}

#[tokio::test]
async fn test_mutual_match_can_end() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    assert_ok!(matcher.advance_match("alice", "bob", MatchStatus::Accepted).await);
    assert_ok!(matcher.advance_match("bob", "alice", MatchStatus::Accepted).await);

    let ended = assert_ok!(matcher.advance_match("alice", "bob", MatchStatus::Ended).await);
    assert_eq!(ended.status, MatchStatus::Ended);
    assert!(ended.updated_at >= ended.created_at);
    assert_eq!(repo.get_match("bob", "alice").await.unwrap().status, MatchStatus::Mutual);
}

#[tokio::test]
async fn test_user_matches_filters_and_pages() {
    let repo = seeded_repository().await;
    let matcher = matcher_for(&repo);

    assert_ok!(matcher.advance_match("alice", "bob", MatchStatus::Pending).await);
    assert_ok!(matcher.advance_match("alice", "carol", MatchStatus::Rejected).await);
    assert_ok!(matcher.advance_match("bob", "alice", MatchStatus::Pending).await);

    let all = assert_ok!(matcher.user_matches("alice", None, MatchPage::default()).await);
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|m| m.user_id == "alice"));

    let rejected = assert_ok!(
        matcher
            .user_matches("alice", Some(MatchStatus::Rejected), MatchPage::default())
            .await
    );
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].target_id, "carol");

    let page = MatchPage { limit: 1, offset: 1 };
    assert_eq!(assert_ok!(matcher.user_matches("alice", None, page).await).len(), 1);

    let bad = MatchPage { limit: 0, offset: 0 };
    assert!(matches!(
        matcher.user_matches("alice", None, bad).await,
        Err(MatchError::InvalidRequest(_))
    ));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL"]
async fn test_postgres_mutual_match() {
    use matchbot_core::services::{PgRepository, ProfileRepository};
    use std::time::Duration;

    let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/matchbot_test".to_string());
    let repo = PgRepository::new(&url, 5, 1, Duration::from_secs(5), Duration::from_secs(60)).await.expect("database");

    assert!(assert_ok!(repo.health_check().await));
    let matcher = Matcher::with_default_config(Arc::new(repo));

    let a = format!("pg-a-{}", uuid::Uuid::new_v4());
    let b = format!("pg-b-{}", uuid::Uuid::new_v4());
    assert_ok!(matcher.advance_match(&a, &b, MatchStatus::Accepted).await);
    let promoted = assert_ok!(matcher.advance_match(&b, &a, MatchStatus::Accepted).await);
    assert_eq!(promoted.status, MatchStatus::Mutual);
    assert!(assert_ok!(matcher.conversation_between(&a, &b).await).is_some());
    assert!(assert_ok!(matcher.repository().fetch_profile(&a).await).is_none());
}
