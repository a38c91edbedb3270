//! End-to-end pipeline tests: load (in-memory) -> expand -> validate ->
//! canonicalize -> plan -> execute -> persist, exercising the full chain no
//! single unit test module drives on its own.

use masterchef::config::EngineConfig;
use masterchef::executor::CancellationToken;
use masterchef::handlers::HandlerRegistry;
use masterchef::model::{
    Document, Execution, Host, Resource, RunStatus, RESOURCE_TYPE_COMMAND, RESOURCE_TYPE_FILE,
};
use masterchef::run_store::RunStore;
use masterchef::transport::TransportRegistry;
use masterchef::{canonical, expander, planner, validation};

fn build_config() -> (tempfile::TempDir, EngineConfig) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        base_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    (dir, config)
}

#[tokio::test]
async fn full_pipeline_applies_a_file_and_a_dependent_command() {
    let (_tmp, config) = build_config();
    let work_dir = tempfile::tempdir().unwrap();
    let target_path = work_dir.path().join("greeting.txt");

    let mut document = Document::default();
    document.version = "v0".to_string();
    document.inventory.hosts.push(Host {
        name: "localhost".to_string(),
        transport: "local".to_string(),
        ..Default::default()
    });

    document.resources.push(Resource {
        id: "write-greeting".to_string(),
        kind: RESOURCE_TYPE_FILE.to_string(),
        host: "localhost".to_string(),
        path: target_path.to_string_lossy().to_string(),
        content: "hello, {{ env }}".to_string(),
        ..Default::default()
    });
    document.resources.push(Resource {
        id: "print-greeting".to_string(),
        kind: RESOURCE_TYPE_COMMAND.to_string(),
        host: "localhost".to_string(),
        command: format!("cat {}", target_path.to_string_lossy()),
        depends_on: vec!["write-greeting".to_string()],
        ..Default::default()
    });

    expander::expand(&mut document);
    validation::validate_and_normalize(&mut document).expect("document should be valid");
    let canonical_document = canonical::canonicalize(&document);
    let plan = planner::plan(&canonical_document).expect("plan should be acyclic");

    assert_eq!(plan.steps.len(), 2);
    assert_eq!(plan.steps[0].resource.id, "write-greeting");
    assert_eq!(plan.steps[1].resource.id, "print-greeting");

    let transports = TransportRegistry::new();
    let handlers = HandlerRegistry::new();
    let token = CancellationToken::new();

    let run = masterchef::executor::execute(&plan, &transports, &handlers, &config, &token)
        .await
        .expect("execution should not error");

    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.results.len(), 2);

    let written = std::fs::read_to_string(&target_path).unwrap();
    assert_eq!(written, "hello, {{ env }}".replace("{{ env }}", ""));

    let store = RunStore::new(config.runs_dir());
    store.save_run(&run).expect("run should persist");
    let fetched = store.get_run(&run.id).expect("run should be retrievable");
    assert_eq!(fetched.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn matrix_expansion_and_canonicalization_survive_the_full_pipeline() {
    let (_tmp, config) = build_config();

    let mut document = Document::default();
    document.version = "v0".to_string();
    document.execution = Execution {
        strategy: "linear".to_string(),
        ..Execution::default()
    };
    document.inventory.hosts.push(Host {
        name: "localhost".to_string(),
        transport: "local".to_string(),
        ..Default::default()
    });

    let mut matrixed = Resource {
        id: "echo-{{env}}".to_string(),
        kind: RESOURCE_TYPE_COMMAND.to_string(),
        host: "localhost".to_string(),
        command: "echo {{env}}".to_string(),
        ..Default::default()
    };
    matrixed
        .matrix
        .insert("env".to_string(), vec!["staging".to_string(), "prod".to_string()]);
    document.resources.push(matrixed);

    expander::expand(&mut document);
    assert_eq!(document.resources.len(), 2);

    validation::validate_and_normalize(&mut document).expect("expanded document should be valid");
    let canonical_once = canonical::canonicalize(&document);
    let canonical_twice = canonical::canonicalize(&canonical_once);
    assert_eq!(
        canonical_once.resources.iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
        canonical_twice.resources.iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
    );

    let plan = planner::plan(&canonical_once).expect("plan should be acyclic");
    assert_eq!(plan.steps.len(), 2);

    let transports = TransportRegistry::new();
    let handlers = HandlerRegistry::new();
    let token = CancellationToken::new();

    let run = masterchef::executor::execute(&plan, &transports, &handlers, &config, &token)
        .await
        .expect("execution should not error");
    assert_eq!(run.status, RunStatus::Succeeded);
    assert_eq!(run.results.len(), 2);
}

#[tokio::test]
async fn a_failing_step_halts_linear_execution_and_is_recorded_as_failed() {
    let (_tmp, config) = build_config();

    let mut document = Document::default();
    document.version = "v0".to_string();
    document.inventory.hosts.push(Host {
        name: "localhost".to_string(),
        ..Default::default()
    });
    document.resources.push(Resource {
        id: "boom".to_string(),
        kind: RESOURCE_TYPE_COMMAND.to_string(),
        host: "localhost".to_string(),
        command: "exit 7".to_string(),
        ..Default::default()
    });
    document.resources.push(Resource {
        id: "never-runs".to_string(),
        kind: RESOURCE_TYPE_COMMAND.to_string(),
        host: "localhost".to_string(),
        command: "echo unreachable".to_string(),
        depends_on: vec!["boom".to_string()],
        ..Default::default()
    });

    expander::expand(&mut document);
    validation::validate_and_normalize(&mut document).expect("document should be valid");
    let canonical_document = canonical::canonicalize(&document);
    let plan = planner::plan(&canonical_document).expect("plan should be acyclic");

    let transports = TransportRegistry::new();
    let handlers = HandlerRegistry::new();
    let token = CancellationToken::new();

    let run = masterchef::executor::execute(&plan, &transports, &handlers, &config, &token)
        .await
        .expect("execution should not error");

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.results.len(), 1);
    assert_eq!(run.results[0].resource_id, "boom");
}
