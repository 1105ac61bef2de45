//! End-to-end executor scenarios over the fixture bricks.

use super::*;
use crate::testing::{init_tracing, pipeline, test_component, test_registry};
use crate::trace::Branch;
use pretty_assertions::assert_eq;
use serde_json::json;

fn executor() -> (PipelineExecutor, Arc<TraceSink>) {
    init_tracing();
    let registry = test_registry();
    let state = Arc::new(StateController::in_memory());
    let trace = Arc::new(TraceSink::new());
    (
        PipelineExecutor::new(registry.snapshot(), state, trace.clone()),
        trace,
    )
}

#[tokio::test]
async fn test_output_key_binds_for_subsequent_steps() {
    let (executor, _) = executor();
    let pipeline = pipeline(json!([
        {"id": "brickflow/transform/echo", "outputKey": "a", "config": {"value": 1}},
        {"id": "brickflow/transform/echo", "config": {
            "value": {"__type__": "var", "__value__": "@a"},
        }},
    ]));

    let result = executor
        .run(&pipeline, RunInput::new(test_component()))
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output, Some(json!(1)));
}

#[tokio::test]
async fn test_falsy_condition_skips_step_with_trace_marker() {
    let (executor, trace) = executor();
    let component = test_component();
    let instance_id = Uuid::new_v4();
    let pipeline = pipeline(json!([
        {
            "id": "brickflow/transform/echo",
            "instanceId": instance_id,
            "if": [
                {"id": "brickflow/transform/echo", "config": {"value": false}},
            ],
            "outputKey": "skipped",
            "config": {"value": "never"},
        },
        {"id": "brickflow/transform/echo", "config": {"value": "after"}},
    ]));

    let result = executor
        .run(&pipeline, RunInput::new(component.clone()))
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output, Some(json!("after")));

    let records = trace.get_by_instance_id(component.mod_component_id, instance_id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, TraceOutcome::Skipped);
    assert_eq!(records[0].rendered_args, None);
}

#[tokio::test]
async fn test_skipped_step_binds_nothing() {
    let (executor, _) = executor();
    let pipeline = pipeline(json!([
        {
            "id": "brickflow/transform/echo",
            "if": [
                {"id": "brickflow/transform/echo", "config": {"value": 0}},
            ],
            "outputKey": "a",
            "config": {"value": "never"},
        },
        {"id": "brickflow/transform/echo", "config": {
            "value": {"__type__": "var", "__value__": "@a"},
        }},
    ]));

    let result = executor
        .run(&pipeline, RunInput::new(test_component()))
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output, Some(Value::Null));
}

#[tokio::test]
async fn test_try_catch_recovers_from_business_error() {
    let (executor, _) = executor();
    let pipeline = pipeline(json!([
        {
            "id": "brickflow/control/try-catch",
            "config": {
                "try": {"__type__": "pipeline", "__value__": [
                    {"id": "brickflow/test/business-error", "config": {"message": "nope"}},
                ]},
                "catch": {"__type__": "pipeline", "__value__": [
                    {"id": "brickflow/transform/echo", "config": {
                        "value": {"__type__": "var", "__value__": "@error.message"},
                    }},
                ]},
            },
        },
    ]));

    let result = executor
        .run(&pipeline, RunInput::new(test_component()))
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output, Some(json!("nope")));
}

#[tokio::test]
async fn test_catch_sees_business_classification() {
    let (executor, _) = executor();
    let pipeline = pipeline(json!([
        {
            "id": "brickflow/control/try-catch",
            "config": {
                "try": {"__type__": "pipeline", "__value__": [
                    {"id": "brickflow/test/runtime-error"},
                ]},
                "catch": {"__type__": "pipeline", "__value__": [
                    {"id": "brickflow/transform/echo", "config": {
                        "value": {"__type__": "var", "__value__": "@error.isBusinessError"},
                    }},
                ]},
            },
        },
    ]));

    let result = executor
        .run(&pipeline, RunInput::new(test_component()))
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output, Some(json!(false)));
}

#[tokio::test]
async fn test_failure_aborts_remainder_with_location() {
    let (executor, trace) = executor();
    let component = test_component();
    let after_id = Uuid::new_v4();
    let pipeline = pipeline(json!([
        {"id": "brickflow/transform/echo", "config": {"value": "ok"}},
        {"id": "brickflow/test/runtime-error", "config": {"message": "exploded"}},
        {"id": "brickflow/transform/echo", "instanceId": after_id, "config": {"value": "x"}},
    ]));

    let result = executor
        .run(&pipeline, RunInput::new(component.clone()))
        .await;

    assert_eq!(result.status, RunStatus::Failed);
    let Some(BrickflowError::Step(step)) = result.error else {
        panic!("expected a located step error");
    };
    assert_eq!(step.location.path, "steps[1]");
    assert_eq!(step.location.brick_id.to_string(), "brickflow/test/runtime-error");

    // The step after the failure never ran.
    assert!(trace
        .get_by_instance_id(component.mod_component_id, after_id)
        .is_empty());
}

#[tokio::test]
async fn test_unknown_brick_fails_as_configuration_error() {
    let (executor, _) = executor();
    let pipeline = pipeline(json!([
        {"id": "brickflow/does/not-exist"},
    ]));

    let result = executor
        .run(&pipeline, RunInput::new(test_component()))
        .await;

    assert_eq!(result.status, RunStatus::Failed);
    let error = result.error.unwrap();
    assert!(error.is_configuration());
    assert!(error.to_string().contains("brickflow/does/not-exist"));
}

#[tokio::test]
async fn test_gated_off_step_tolerates_unregistered_brick() {
    let (executor, trace) = executor();
    let component = test_component();
    let instance_id = Uuid::new_v4();
    let pipeline = pipeline(json!([
        {
            "id": "brickflow/experimental/not-installed",
            "instanceId": instance_id,
            "if": [
                {"id": "brickflow/transform/echo", "config": {"value": false}},
            ],
        },
        {"id": "brickflow/transform/echo", "config": {"value": "after"}},
    ]));

    let result = executor
        .run(&pipeline, RunInput::new(component.clone()))
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output, Some(json!("after")));

    let records = trace.get_by_instance_id(component.mod_component_id, instance_id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, TraceOutcome::Skipped);
}

#[tokio::test]
async fn test_cancelled_token_stops_the_run_between_steps() {
    let (executor, trace) = executor();
    let component = test_component();
    let instance_id = Uuid::new_v4();
    let pipeline = pipeline(json!([
        {"id": "brickflow/transform/echo", "instanceId": instance_id, "config": {"value": 1}},
    ]));

    let cancellation = Arc::new(CancellationToken::new());
    cancellation.cancel("navigation");

    let result = executor
        .run(
            &pipeline,
            RunInput::new(component.clone()).with_cancellation(cancellation),
        )
        .await;

    assert_eq!(result.status, RunStatus::Cancelled);
    assert!(result.error.unwrap().is_cancelled());
    // No error records for steps that never executed.
    assert!(trace
        .get_by_instance_id(component.mod_component_id, instance_id)
        .is_empty());
}

#[tokio::test]
async fn test_sub_pipeline_bindings_do_not_leak_to_parent() {
    let (executor, _) = executor();
    let pipeline = pipeline(json!([
        {
            "id": "brickflow/control/try-catch",
            "config": {
                "try": {"__type__": "pipeline", "__value__": [
                    {"id": "brickflow/transform/echo", "outputKey": "x", "config": {"value": 5}},
                ]},
            },
        },
        {"id": "brickflow/transform/echo", "config": {
            "value": {"__type__": "var", "__value__": "@x"},
        }},
    ]));

    let result = executor
        .run(&pipeline, RunInput::new(test_component()))
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output, Some(Value::Null));
}

#[tokio::test]
async fn test_nested_steps_carry_branch_lineage() {
    let (executor, trace) = executor();
    let component = test_component();
    let instance_id = Uuid::new_v4();
    let pipeline = pipeline(json!([
        {
            "id": "brickflow/control/try-catch",
            "config": {
                "try": {"__type__": "pipeline", "__value__": [
                    {
                        "id": "brickflow/transform/echo",
                        "instanceId": instance_id,
                        "config": {"value": 1},
                    },
                ]},
            },
        },
    ]));

    let result = executor
        .run(&pipeline, RunInput::new(component.clone()))
        .await;
    assert_eq!(result.status, RunStatus::Completed);

    let records = trace.get_by_instance_id(component.mod_component_id, instance_id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].branch_stack, vec![Branch::new("try", 0)]);
}

#[tokio::test]
async fn test_trace_records_context_args_and_output() {
    let (executor, trace) = executor();
    let component = test_component();
    let instance_id = Uuid::new_v4();
    let pipeline = pipeline(json!([
        {
            "id": "brickflow/transform/echo",
            "instanceId": instance_id,
            "config": {
                "value": {"__type__": "nunjucks", "__value__": "{{ @input.name }}"},
            },
        },
    ]));

    let result = executor
        .run(
            &pipeline,
            RunInput::new(component.clone()).with_input(json!({"name": "Ada"})),
        )
        .await;
    assert_eq!(result.output, Some(json!("Ada")));

    let records = trace.get_by_instance_id(component.mod_component_id, instance_id);
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].outcome,
        TraceOutcome::Output { value: json!("Ada") }
    );
    assert_eq!(records[0].rendered_args, Some(json!({"value": "Ada"})));
    assert_eq!(records[0].template_context["@input"], json!({"name": "Ada"}));
}

#[tokio::test]
async fn test_empty_pipeline_completes_with_null() {
    let (executor, _) = executor();
    let result = executor
        .run(&Pipeline::default(), RunInput::new(test_component()))
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output, Some(Value::Null));
}
