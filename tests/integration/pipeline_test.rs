//! Pipeline Integration Tests
//!
//! Whole diagnostic runs: document consolidation, synthesis, specialist and
//! urgency triage, cancellation, usage reporting and model fallback.

use std::sync::Arc;
use std::time::Duration;

use medpanel::{
    CancellationToken, ClinicalContext, DiagnosticEngine, DocumentAnalysis, EngineError,
    PanelConfigBuilder, PanelSelection, Specialty, UrgencyLevel,
};
use medpanel_llm::{LlmError, ModelFallbackChain};

use crate::support::{critic_json, engine, engine_with_usage, happy_path, Reply, ScriptedProvider};

// ============================================================================
// Helper Functions
// ============================================================================

fn thyroid_context() -> ClinicalContext {
    ClinicalContext::new(
        "TSH 8.9 mIU/L (ref 0.4-4.0). Free T4 0.6 ng/dL. Anti-TPO 350 IU/mL.",
        "41-year-old woman, weight gain, cold intolerance, constipation.",
    )
    .with_patient_id("patient-0042")
}

fn two_specialists() -> PanelSelection {
    PanelSelection::Specialties(vec![Specialty::Endocrinology, Specialty::Nutrition])
}

fn blood_panel() -> DocumentAnalysis {
    DocumentAnalysis::new(
        "doc-blood",
        "blood_panel.pdf",
        "TSH 8.9 mIU/L, free T4 0.6 ng/dL.",
        "Your thyroid hormone is low.",
    )
    .with_document_type("lab_panel")
}

fn ultrasound() -> DocumentAnalysis {
    DocumentAnalysis::new(
        "doc-us",
        "thyroid_us.pdf",
        "Diffusely heterogeneous thyroid, no nodules.",
        "The ultrasound shows an inflamed thyroid without lumps.",
    )
    .with_document_type("imaging")
}

// ============================================================================
// Documents
// ============================================================================

#[tokio::test]
async fn test_single_document_skips_consolidation() {
    let provider = ScriptedProvider::new(happy_path);
    let engine = engine(provider.clone(), PanelConfigBuilder::new().build().unwrap());

    let result = engine
        .diagnose_documents(
            &[blood_panel()],
            "Fatigue for 6 months",
            Some("patient-0042"),
            two_specialists(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(provider.count("consolidation"), 0);
    assert_eq!(result.source_document_ids, vec!["doc-blood".to_string()]);
    assert_eq!(
        result.patient_explanation.as_deref(),
        Some("Your thyroid hormone is low.")
    );
    assert_eq!(result.correlations, None);

    let analyzer = &provider.calls_for("analyzer", Some(Specialty::Endocrinology))[0];
    assert!(analyzer.prompt.contains("TSH 8.9 mIU/L, free T4 0.6 ng/dL."));
    assert!(analyzer.prompt.contains("Fatigue for 6 months"));
}

#[tokio::test]
async fn test_multiple_documents_are_consolidated_once() {
    let provider = ScriptedProvider::new(happy_path);
    let engine = engine(provider.clone(), PanelConfigBuilder::new().build().unwrap());

    let result = engine
        .diagnose_documents(
            &[blood_panel(), ultrasound()],
            "Fatigue for 6 months",
            None,
            two_specialists(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(provider.count("consolidation"), 1);
    let consolidation = &provider.calls_for("consolidation", None)[0];
    assert!(consolidation.prompt.contains("blood_panel.pdf"));
    assert!(consolidation.prompt.contains("thyroid_us.pdf"));

    assert_eq!(result.source_document_ids, vec!["doc-blood", "doc-us"]);
    assert_eq!(
        result.correlations.as_deref(),
        Some("Findings across documents are consistent")
    );
    let analyzer = &provider.calls_for("analyzer", Some(Specialty::Nutrition))[0];
    assert!(analyzer.prompt.contains("Unified summary of all documents"));
}

#[tokio::test]
async fn test_failed_consolidation_concatenates_documents() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "consolidation" {
            return Reply::error(LlmError::ServerError {
                message: "internal".into(),
                status: Some(500),
            });
        }
        happy_path(call)
    });
    let engine = engine(provider.clone(), PanelConfigBuilder::new().build().unwrap());

    let result = engine
        .diagnose_documents(
            &[blood_panel(), ultrasound()],
            "",
            None,
            two_specialists(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let analyzer = &provider.calls_for("analyzer", Some(Specialty::Endocrinology))[0];
    assert!(analyzer.prompt.contains("Document 1/2: blood_panel.pdf (lab_panel)"));
    assert!(analyzer.prompt.contains("Document 2/2: thyroid_us.pdf (imaging)"));
    assert_eq!(result.source_document_ids.len(), 2);
    assert_eq!(result.correlations, None);
}

#[tokio::test]
async fn test_no_documents_is_rejected() {
    let provider = ScriptedProvider::new(happy_path);
    let engine = engine(provider.clone(), PanelConfigBuilder::new().build().unwrap());

    let err = engine
        .diagnose_documents(&[], "", None, PanelSelection::All, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoDocuments));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_empty_exam_text_is_rejected() {
    let provider = ScriptedProvider::new(happy_path);
    let engine = engine(provider.clone(), PanelConfigBuilder::new().build().unwrap());

    let err = engine
        .diagnose(
            ClinicalContext::new("   ", "history only"),
            PanelSelection::All,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(_)));
    assert!(provider.calls().is_empty());
}

// ============================================================================
// Synthesis and urgency
// ============================================================================

#[tokio::test]
async fn test_synthesis_failure_fails_the_run() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "synthesis" {
            return Reply::text(r#"{"diagnosis": ""}"#);
        }
        happy_path(call)
    });
    let engine = engine(provider.clone(), PanelConfigBuilder::new().build().unwrap());

    let err = engine
        .diagnose(thyroid_context(), two_specialists(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Synthesis(_)));
    assert_eq!(provider.count("urgency"), 0);
}

#[tokio::test]
async fn test_urgency_triage_sets_priority() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "urgency" {
            return Reply::text(r#"{"priority": "high", "justification": "Overt hypothyroidism"}"#);
        }
        happy_path(call)
    });
    let engine = engine(provider.clone(), PanelConfigBuilder::new().build().unwrap());

    let result = engine
        .diagnose(thyroid_context(), two_specialists(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.priority, Some(UrgencyLevel::High));

    let urgency = &provider.calls_for("urgency", None)[0];
    assert!(urgency.prompt.contains("Iron deficiency anemia"));
}

#[tokio::test]
async fn test_urgency_failure_leaves_priority_unset() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "urgency" {
            return Reply::text("not json at all");
        }
        happy_path(call)
    });
    let engine = engine(provider, PanelConfigBuilder::new().build().unwrap());

    let result = engine
        .diagnose(thyroid_context(), two_specialists(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.priority, None);
    assert_eq!(result.diagnosis, "Iron deficiency anemia");
}

#[tokio::test]
async fn test_urgency_triage_disabled_makes_no_call() {
    let provider = ScriptedProvider::new(happy_path);
    let config = PanelConfigBuilder::new().urgency_triage(false).build().unwrap();
    let engine = engine(provider.clone(), config);

    let result = engine
        .diagnose(thyroid_context(), two_specialists(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.priority, None);
    assert_eq!(provider.count("urgency"), 0);
}

// ============================================================================
// Specialist triage
// ============================================================================

#[tokio::test]
async fn test_triage_selects_panel() {
    let provider = ScriptedProvider::new(happy_path);
    let config = PanelConfigBuilder::new().urgency_triage(false).build().unwrap();
    let engine = engine(provider.clone(), config);

    let result = engine
        .diagnose(thyroid_context(), PanelSelection::Triage, &CancellationToken::new())
        .await
        .unwrap();

    let selected: Vec<Specialty> = result.specialist_findings.iter().map(|r| r.specialty).collect();
    assert_eq!(selected, vec![Specialty::Hematology, Specialty::Nutrition]);
    assert_eq!(provider.count("triage"), 1);
    assert_eq!(provider.count("analyzer"), 2);
}

#[tokio::test]
async fn test_triage_failure_falls_back_to_default_panel() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "triage" {
            return Reply::error(LlmError::NetworkError {
                message: "dns".into(),
            });
        }
        happy_path(call)
    });
    let config = PanelConfigBuilder::new()
        .urgency_triage(false)
        .default_specialties(["endocrinology", "cardiology"])
        .build()
        .unwrap();
    let engine = engine(provider.clone(), config);
    assert_eq!(
        engine.default_panel(),
        &[Specialty::Endocrinology, Specialty::Cardiology]
    );

    let result = engine
        .diagnose(thyroid_context(), PanelSelection::Triage, &CancellationToken::new())
        .await
        .unwrap();

    let selected: Vec<Specialty> = result.specialist_findings.iter().map(|r| r.specialty).collect();
    assert_eq!(selected, vec![Specialty::Endocrinology, Specialty::Cardiology]);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancellation_returns_promptly() {
    let provider = ScriptedProvider::new(|call| {
        if call.stage == "analyzer" {
            return happy_path(call).after(Duration::from_secs(30));
        }
        happy_path(call)
    });
    let engine = engine(provider.clone(), PanelConfigBuilder::new().build().unwrap());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let err = engine
        .diagnose(thyroid_context(), two_specialists(), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(provider.count("synthesis"), 0);
}

#[tokio::test]
async fn test_pre_cancelled_run_makes_no_calls() {
    let provider = ScriptedProvider::new(happy_path);
    let engine = engine(provider.clone(), PanelConfigBuilder::new().build().unwrap());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine
        .diagnose(thyroid_context(), PanelSelection::All, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert!(provider.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_request_stops_analyzer_calls() {
    let provider = ScriptedProvider::new(|call| match call.stage.as_str() {
        "analyzer" => happy_path(call).after(Duration::from_secs(10)),
        "validator" => Reply::text(critic_json(40, "Name the thyroid diagnosis.")),
        _ => happy_path(call),
    });
    let config = PanelConfigBuilder::new()
        .max_retries(2)
        .urgency_triage(false)
        .build()
        .unwrap();
    let engine = engine(provider.clone(), config);

    let request = tokio::spawn(async move {
        engine
            .diagnose(thyroid_context(), two_specialists(), &CancellationToken::new())
            .await
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(provider.count("analyzer"), 2);
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(provider.count("analyzer"), 2);
    assert_eq!(provider.count("validator"), 0);
    assert_eq!(provider.count("synthesis"), 0);
}

// ============================================================================
// Usage reporting
// ============================================================================

#[tokio::test]
async fn test_usage_records_every_call() {
    let provider = ScriptedProvider::new(happy_path);
    let (engine, sink) = engine_with_usage(provider, PanelConfigBuilder::new().build().unwrap());

    engine
        .diagnose(thyroid_context(), two_specialists(), &CancellationToken::new())
        .await
        .unwrap();
    let tracker = engine.usage_tracker().unwrap();
    tracker.flush().await.unwrap();

    let records = sink.records();
    // 2 analyzers, 2 critic reviews, synthesis, urgency
    assert_eq!(records.len(), 6);
    assert_eq!(records.iter().filter(|r| r.stage == "analyzer").count(), 2);
    assert_eq!(records.iter().filter(|r| r.stage == "validator").count(), 2);
    assert_eq!(records.iter().filter(|r| r.stage == "synthesis").count(), 1);
    assert_eq!(records.iter().filter(|r| r.stage == "urgency").count(), 1);

    let expected_cost =
        tracker
            .cost_calculator()
            .calculate_cost("gemini-2.5-flash", 1_000, 200, false);
    assert!(expected_cost > 0);
    for record in &records {
        assert_eq!(record.patient_id.as_deref(), Some("patient-0042"));
        assert_eq!(record.model, "gemini-2.5-flash");
        assert_eq!(record.total_tokens(), 1_200);
        assert!(!record.estimated);
        assert_eq!(record.cost_microdollars, expected_cost);
    }
    assert!(records
        .iter()
        .any(|r| r.stage == "analyzer" && r.specialty.as_deref() == Some("endocrinology")));
    assert_eq!(sink.total_cost_microdollars(), expected_cost * 6);

    tracker.shutdown().await.unwrap();
}

// ============================================================================
// Model fallback
// ============================================================================

#[tokio::test]
async fn test_fallback_model_serves_when_primary_fails() {
    let primary = ScriptedProvider::with_model("gemini-2.5-pro", |_| {
        Reply::error(LlmError::ServerError {
            message: "model overloaded".into(),
            status: Some(503),
        })
    });
    let secondary = ScriptedProvider::with_model("gemini-2.5-flash", happy_path);
    let chain = ModelFallbackChain::new(primary.clone())
        .add_fallback(secondary.clone())
        .with_delay(Duration::ZERO);

    let config = PanelConfigBuilder::new().urgency_triage(false).build().unwrap();
    let engine = DiagnosticEngine::builder(Arc::new(chain))
        .config(config)
        .build()
        .unwrap();

    let result = engine
        .diagnose(thyroid_context(), two_specialists(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.specialist_findings.available_count(), 2);
    assert_eq!(primary.calls().len(), secondary.calls().len());
    assert_eq!(secondary.count("synthesis"), 1);
}

#[tokio::test]
async fn test_authentication_failure_does_not_fall_back() {
    let primary = ScriptedProvider::with_model("gemini-2.5-pro", |_| {
        Reply::error(LlmError::AuthenticationFailed {
            message: "API key not valid".into(),
        })
    });
    let secondary = ScriptedProvider::with_model("gemini-2.5-flash", happy_path);
    let chain = ModelFallbackChain::new(primary.clone())
        .add_fallback(secondary.clone())
        .with_delay(Duration::ZERO);

    let engine = DiagnosticEngine::builder(Arc::new(chain)).build().unwrap();
    let err = engine
        .diagnose(thyroid_context(), two_specialists(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Synthesis(LlmError::AuthenticationFailed { .. })));
    assert!(secondary.calls().is_empty());
}
