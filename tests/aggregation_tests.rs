use std::sync::Arc;

use hirequeue::aggregate::{Aggregator, CompletionRule};
use hirequeue::error::AggregateError;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[tokio::test]
async fn test_weighted_mean_of_two_judges() {
    let aggregator = Aggregator::new();
    aggregator
        .submit_contribution("iv-1", "hiring-manager", 1.0, 80.0)
        .await
        .unwrap();
    aggregator
        .submit_contribution("iv-1", "technical-lead", 2.0, 90.0)
        .await
        .unwrap();

    let view = aggregator.get_aggregated("iv-1").await.unwrap();
    assert!(close(view.aggregated_score.unwrap(), 86.666_666_7));
    assert_eq!(view.contributions_received, 2);
    // Default rule waits for an explicit finalize.
    assert!(!view.complete);
    assert!(view.contributions_expected.is_none());
}

#[tokio::test]
async fn test_weights_are_normalized_at_read_time() {
    let small = Aggregator::new();
    small.submit_contribution("iv", "a", 1.0, 60.0).await.unwrap();
    small.submit_contribution("iv", "b", 3.0, 100.0).await.unwrap();

    let scaled = Aggregator::new();
    scaled.submit_contribution("iv", "a", 10.0, 60.0).await.unwrap();
    scaled.submit_contribution("iv", "b", 30.0, 100.0).await.unwrap();

    let a = small.get_aggregated("iv").await.unwrap().aggregated_score;
    let b = scaled.get_aggregated("iv").await.unwrap().aggregated_score;
    assert!(close(a.unwrap(), 90.0));
    assert!(close(b.unwrap(), 90.0));

    let stored = scaled.contributions("iv").await.unwrap();
    assert_eq!(stored[0].weight, 10.0, "weights are stored as submitted");
}

#[tokio::test]
async fn test_huge_weights_keep_a_finite_mean() {
    let aggregator = Aggregator::new();
    aggregator
        .submit_contribution("iv-1", "hiring-manager", 1e308, 90.0)
        .await
        .unwrap();
    aggregator
        .submit_contribution("iv-1", "technical-lead", 1e308, 80.0)
        .await
        .unwrap();

    let view = aggregator.get_aggregated("iv-1").await.unwrap();
    let score = view.aggregated_score.unwrap();
    assert!(score.is_finite());
    assert!(close(score, 85.0));

    let json = serde_json::to_value(&view).unwrap();
    assert!(json["aggregated_score"].is_number());
}

#[tokio::test]
async fn test_zero_total_weight_has_no_weighted_input() {
    let aggregator = Aggregator::new();
    aggregator
        .submit_contribution("iv-1", "observer", 0.0, 70.0)
        .await
        .unwrap();

    assert_eq!(
        aggregator.get_aggregated("iv-1").await,
        Err(AggregateError::NoWeightedInput("iv-1".to_string()))
    );

    // A weighted contribution makes the panel readable again.
    aggregator
        .submit_contribution("iv-1", "hr", 1.0, 50.0)
        .await
        .unwrap();
    let view = aggregator.get_aggregated("iv-1").await.unwrap();
    assert!(close(view.aggregated_score.unwrap(), 50.0));
}

#[tokio::test]
async fn test_unknown_key() {
    let aggregator = Aggregator::new();
    assert_eq!(
        aggregator.get_aggregated("missing").await,
        Err(AggregateError::KeyNotFound("missing".to_string()))
    );
    assert!(matches!(
        aggregator.finalize("missing").await,
        Err(AggregateError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn test_invalid_contributions_are_rejected() {
    let aggregator = Aggregator::new();
    for (key, role, weight, score) in [
        ("", "hr", 1.0, 50.0),
        ("iv", "", 1.0, 50.0),
        ("iv", "hr", -1.0, 50.0),
        ("iv", "hr", f64::NAN, 50.0),
        ("iv", "hr", 1.0, f64::INFINITY),
    ] {
        assert!(matches!(
            aggregator.submit_contribution(key, role, weight, score).await,
            Err(AggregateError::InvalidContribution(_))
        ));
    }
    assert_eq!(aggregator.panel_count().await, 0);
}

#[tokio::test]
async fn test_resubmission_replaces_role() {
    let aggregator = Aggregator::new();
    aggregator.submit_contribution("iv", "hr", 1.0, 40.0).await.unwrap();
    aggregator.submit_contribution("iv", "hr", 1.0, 70.0).await.unwrap();

    let view = aggregator.get_aggregated("iv").await.unwrap();
    assert_eq!(view.contributions_received, 1);
    assert!(close(view.aggregated_score.unwrap(), 70.0));
}

#[tokio::test]
async fn test_finalize_completes_default_rule() {
    let aggregator = Aggregator::new();
    aggregator.submit_contribution("iv", "hr", 1.0, 65.0).await.unwrap();

    let view = aggregator.finalize("iv").await.unwrap();
    assert!(view.complete);
    assert!(view.finalize_requested);
    assert!(aggregator.get_aggregated("iv").await.unwrap().complete);
}

#[tokio::test]
async fn test_expected_count_rule() {
    let aggregator = Aggregator::new();
    aggregator
        .configure("iv", CompletionRule::expected_count(2))
        .await;

    let empty = aggregator.get_aggregated("iv").await.unwrap();
    assert!(empty.aggregated_score.is_none());
    assert_eq!(empty.contributions_expected, Some(2));
    assert!(!empty.complete);

    aggregator.submit_contribution("iv", "a", 1.0, 70.0).await.unwrap();
    assert!(!aggregator.get_aggregated("iv").await.unwrap().complete);

    aggregator.submit_contribution("iv", "b", 1.0, 90.0).await.unwrap();
    let view = aggregator.get_aggregated("iv").await.unwrap();
    assert!(view.complete);
    assert!(close(view.aggregated_score.unwrap(), 80.0));
}

#[tokio::test]
async fn test_expected_roles_rule() {
    let aggregator = Aggregator::new();
    aggregator
        .configure(
            "iv",
            CompletionRule::expected_roles(["hiring-manager", "technical-lead"]),
        )
        .await;

    aggregator
        .submit_contribution("iv", "hiring-manager", 1.0, 80.0)
        .await
        .unwrap();
    aggregator.submit_contribution("iv", "hr", 1.0, 60.0).await.unwrap();
    let partial = aggregator.get_aggregated("iv").await.unwrap();
    assert!(!partial.complete, "an unlisted role does not complete the panel");
    assert_eq!(partial.contributions_received, 2);

    aggregator
        .submit_contribution("iv", "technical-lead", 2.0, 90.0)
        .await
        .unwrap();
    assert!(aggregator.get_aggregated("iv").await.unwrap().complete);
}

#[tokio::test]
async fn test_configure_if_absent_keeps_existing_rule() {
    let aggregator = Aggregator::new();
    assert!(
        aggregator
            .configure_if_absent("iv", CompletionRule::expected_count(1))
            .await
    );
    assert!(
        !aggregator
            .configure_if_absent("iv", CompletionRule::expected_count(5))
            .await
    );
    aggregator.submit_contribution("iv", "hr", 1.0, 50.0).await.unwrap();
    assert!(aggregator.get_aggregated("iv").await.unwrap().complete);
}

#[tokio::test]
async fn test_custom_rule() {
    let aggregator = Aggregator::new();
    aggregator
        .configure(
            "iv",
            CompletionRule::new(None, |p| p.contributions().map(|c| c.weight).sum::<f64>() >= 3.0),
        )
        .await;
    aggregator.submit_contribution("iv", "a", 1.0, 50.0).await.unwrap();
    assert!(!aggregator.get_aggregated("iv").await.unwrap().complete);
    aggregator.submit_contribution("iv", "b", 2.0, 50.0).await.unwrap();
    assert!(aggregator.get_aggregated("iv").await.unwrap().complete);
}

#[tokio::test]
async fn test_result_is_independent_of_arrival_order() {
    let forward = Aggregator::new();
    let backward = Aggregator::new();
    let judges = [
        ("a", 0.3, 71.3),
        ("b", 1.7, 88.9),
        ("c", 2.1, 64.2),
        ("d", 0.9, 93.7),
    ];
    for (role, weight, score) in judges {
        forward.submit_contribution("iv", role, weight, score).await.unwrap();
    }
    for (role, weight, score) in judges.iter().rev() {
        backward
            .submit_contribution("iv", role, *weight, *score)
            .await
            .unwrap();
    }

    assert_eq!(
        forward.get_aggregated("iv").await.unwrap().aggregated_score,
        backward.get_aggregated("iv").await.unwrap().aggregated_score
    );
}

#[tokio::test]
async fn test_concurrent_contributions() {
    let aggregator = Arc::new(Aggregator::new());
    let mut handles = Vec::new();
    for i in 0..20 {
        let aggregator = aggregator.clone();
        handles.push(tokio::spawn(async move {
            aggregator
                .submit_contribution("iv", &format!("judge-{}", i), 1.0, i as f64)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let view = aggregator.get_aggregated("iv").await.unwrap();
    assert_eq!(view.contributions_received, 20);
    assert!(close(view.aggregated_score.unwrap(), 9.5));
}
