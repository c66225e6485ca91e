//! Interpolation pass integration tests: case modes, precedence between
//! runtime and pipeline env, and coverage of nested step fields.

use gantry_pipeline::{parse, CommandStep, Env, MapSS, Pipeline, Step, Value, WaitStep};

fn ss(pairs: Vec<(&str, &str)>) -> MapSS {
    pairs
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
}

fn pipeline_with_command(command: &str) -> Pipeline {
    Pipeline {
        steps: vec![Step::Command(CommandStep {
            command: command.into(),
            ..CommandStep::default()
        })],
        ..Pipeline::default()
    }
}

fn command_of(pipeline: &Pipeline) -> &str {
    match &pipeline.steps[0] {
        Step::Command(step) => &step.command,
        other => panic!("not a command step: {other:?}"),
    }
}

struct Case {
    name: &'static str,
    case_sensitive: bool,
    runtime_env: Vec<(&'static str, &'static str)>,
    pipeline_env: Option<Vec<(&'static str, &'static str)>>,
    want_command: &'static str,
}

#[test]
fn case_modes_and_precedence() {
    let cases = [
        Case {
            name: "case_sensitive_interpolation",
            case_sensitive: true,
            runtime_env: vec![("ENV_VAR_FRIEND", "upper_friend")],
            pipeline_env: None,
            want_command: "echo hello ",
        },
        Case {
            name: "case_insensitive_interpolation",
            case_sensitive: false,
            runtime_env: vec![("ENV_VAR_FRIEND", "upper_friend")],
            pipeline_env: None,
            want_command: "echo hello upper_friend",
        },
        Case {
            name: "case_sensitive_no_collision",
            case_sensitive: true,
            runtime_env: vec![("ENV_VAR_FRIEND", "upper_friend")],
            pipeline_env: Some(vec![("ENV_VAR_friend", "lower_friend")]),
            want_command: "echo hello lower_friend",
        },
        Case {
            name: "case_insensitive_collision_runtime_wins",
            case_sensitive: false,
            runtime_env: vec![("ENV_VAR_FRIEND", "upper_friend")],
            pipeline_env: Some(vec![("ENV_VAR_friend", "lower_friend")]),
            want_command: "echo hello upper_friend",
        },
        Case {
            name: "case_insensitive_folded_runtime_wins",
            case_sensitive: false,
            runtime_env: vec![("ENV_VAR_friend", "lower_friend")],
            pipeline_env: Some(vec![("ENV_VAR_FRIEND", "upper_friend")]),
            want_command: "echo hello lower_friend",
        },
        Case {
            name: "case_sensitive_distinct_casings",
            case_sensitive: true,
            runtime_env: vec![("ENV_VAR_friend", "lower_friend")],
            pipeline_env: Some(vec![("ENV_VAR_FRIEND", "upper_friend")]),
            want_command: "echo hello lower_friend",
        },
    ];

    for case in cases {
        let mut pipeline = pipeline_with_command("echo hello ${ENV_VAR_friend}");
        pipeline.env = case.pipeline_env.clone().map(ss);
        let runtime = Env::from_map(case.runtime_env.clone(), case.case_sensitive);

        pipeline.interpolate(&runtime).unwrap();
        assert_eq!(command_of(&pipeline), case.want_command, "{}", case.name);

        // The pipeline env block itself is never overridden by the
        // runtime env: whatever the author wrote survives.
        assert_eq!(
            pipeline.env,
            case.pipeline_env.map(ss),
            "{}: env block changed",
            case.name
        );
    }
}

#[test]
fn pipeline_env_does_not_override_runtime_env() {
    let mut pipeline = pipeline_with_command("echo ${FOO_BAR}");
    pipeline.env = Some(ss(vec![("FOO_BAR", "pipeline_baz")]));

    let runtime = Env::from_map([("FOO_BAR", "runtime_baz")], true);
    pipeline.interpolate(&runtime).unwrap();

    assert_eq!(command_of(&pipeline), "echo runtime_baz");
    // The env block still carries the author's value.
    assert_eq!(pipeline.env, Some(ss(vec![("FOO_BAR", "pipeline_baz")])));
}

#[test]
fn interpolates_env_keys_as_well_as_values() {
    let input = r#"{
    "env": {
        "${FROM_ENV}TEST1": "MyTest",
        "TEST2": "${FROM_ENV}"
    },
    "steps": ["wait"]
}"#;

    let mut pipeline = parse(input).unwrap().pipeline;
    pipeline
        .interpolate(&Env::from_map([("FROM_ENV", "llamas")], true))
        .unwrap();

    assert_eq!(
        pipeline.env,
        Some(ss(vec![("llamasTEST1", "MyTest"), ("TEST2", "llamas")]))
    );
    assert_eq!(pipeline.steps, vec![Step::Wait(WaitStep::Scalar("wait".into()))]);
}

#[test]
fn env_block_loads_first_in_declaration_order() {
    let input = r#"{
    "env": {
        "TEAM1": "England",
        "TEAM2": "Australia",
        "HEADLINE": "${TEAM1} smashes ${TEAM2} to win the ashes in ${YEAR_FROM_SHELL}!!"
    },
    "steps": [{
        "command": "echo ${HEADLINE}"
    }]
}"#;

    let mut pipeline = parse(input).unwrap().pipeline;
    pipeline
        .interpolate(&Env::from_map([("YEAR_FROM_SHELL", "1912")], true))
        .unwrap();

    assert_eq!(
        pipeline.env,
        Some(ss(vec![
            ("TEAM1", "England"),
            ("TEAM2", "Australia"),
            (
                "HEADLINE",
                "England smashes Australia to win the ashes in 1912!!"
            ),
        ]))
    );
    assert_eq!(
        command_of(&pipeline),
        "echo England smashes Australia to win the ashes in 1912!!"
    );
}

#[test]
fn interpolates_plugin_sources_and_configs() {
    let input = r#"
env:
  ECR_PLUGIN_VER: "v2.7.0"
  ECR_ACCOUNT: "0123456789"
steps:
- label: ":docker: Docker Build"
  command: echo foo
  plugins:
  - ecr#$ECR_PLUGIN_VER:
      login: true
      account_ids: "$ECR_ACCOUNT"
"#;

    let mut pipeline = parse(input).unwrap().pipeline;
    pipeline.interpolate(&Env::new()).unwrap();

    let Step::Command(step) = &pipeline.steps[0] else {
        panic!("not a command step");
    };
    let plugin = &step.plugins.iter().next().unwrap();
    assert_eq!(plugin.source, "ecr#v2.7.0");
    let config = plugin.config.as_ref().unwrap().as_map().unwrap();
    assert_eq!(config.get("login"), Some(&Value::Bool(true)));
    assert_eq!(config.get("account_ids"), Some(&Value::from("0123456789")));
}

#[test]
fn escaped_dollar_in_conditionals() {
    // With interpolation in effect, the trailing anchor dollar must be
    // escaped; the escape collapses to a literal dollar.
    let input = "---\nsteps:\n - wait: ~\n   if: build.env(\"ACCOUNT\") =~ /^(foo|bar)\\$/\n";
    let mut pipeline = parse(input).unwrap().pipeline;
    pipeline.interpolate(&Env::new()).unwrap();

    let Step::Wait(WaitStep::Map(contents)) = &pipeline.steps[0] else {
        panic!("not a wait step");
    };
    assert_eq!(
        contents.get("if"),
        Some(&Value::from("build.env(\"ACCOUNT\") =~ /^(foo|bar)$/"))
    );

    // Without the interpolation pass, the document is untouched.
    let input = "---\nsteps:\n - wait: ~\n   if: build.env(\"ACCOUNT\") =~ /^(foo|bar)$/\n";
    let pipeline = parse(input).unwrap().pipeline;
    let Step::Wait(WaitStep::Map(contents)) = &pipeline.steps[0] else {
        panic!("not a wait step");
    };
    assert_eq!(
        contents.get("if"),
        Some(&Value::from("build.env(\"ACCOUNT\") =~ /^(foo|bar)$/"))
    );
}

#[test]
fn step_env_is_rewritten_but_not_a_lookup_source() {
    let input = r#"
steps:
- command: echo ${STEP_VAR}
  env:
    STEP_VAR: from_step
    OTHER: prefix-${RUNTIME_VAR}
"#;

    let mut pipeline = parse(input).unwrap().pipeline;
    pipeline
        .interpolate(&Env::from_map([("RUNTIME_VAR", "rt")], true))
        .unwrap();

    let Step::Command(step) = &pipeline.steps[0] else {
        panic!("not a command step");
    };
    // STEP_VAR is sealed per-step data: it does not resolve in commands.
    assert_eq!(step.command, "echo ");
    // ...but the step env's own values are still rewritten.
    assert_eq!(step.env.get("OTHER"), Some(&"prefix-rt".to_string()));
    assert_eq!(step.env.get("STEP_VAR"), Some(&"from_step".to_string()));
}

#[test]
fn unresolved_variables_become_empty_everywhere() {
    let input = r#"
steps:
- command: echo ${NOPE}
  label: label-${NOPE}
  key: key-${NOPE}
"#;
    let mut pipeline = parse(input).unwrap().pipeline;
    pipeline.interpolate(&Env::new()).unwrap();
    let Step::Command(step) = &pipeline.steps[0] else {
        panic!("not a command step");
    };
    assert_eq!(step.command, "echo ");
    assert_eq!(step.label, "label-");
    assert_eq!(step.key, "key-");
}

#[test]
fn required_variable_aborts_the_pass() {
    let mut pipeline = pipeline_with_command("echo ${MUST_EXIST?set it in the agent env}");
    let err = pipeline.interpolate(&Env::new()).unwrap_err();
    assert!(err
        .to_string()
        .contains("\"MUST_EXIST\" is not set: set it in the agent env"));
}

#[test]
fn matrix_values_are_interpolated() {
    let input = r#"
env:
  DEFAULT_IMAGE: alpine
steps:
- command: echo hi
  matrix:
    setup:
      image:
        - ${DEFAULT_IMAGE}
        - debian
"#;

    let mut pipeline = parse(input).unwrap().pipeline;
    pipeline.interpolate(&Env::new()).unwrap();

    let Step::Command(step) = &pipeline.steps[0] else {
        panic!("not a command step");
    };
    let setup = step
        .matrix
        .as_ref()
        .unwrap()
        .contents
        .as_map()
        .unwrap()
        .get("setup")
        .unwrap()
        .as_map()
        .unwrap();
    assert_eq!(
        setup.get("image"),
        Some(&Value::Seq(vec![
            Value::from("alpine"),
            Value::from("debian")
        ]))
    );
}

#[test]
fn group_and_remaining_fields_are_covered() {
    let input = r#"
steps:
- group: Deploy ${STAGE}
  key: deploy-${STAGE}
  steps:
  - command: deploy ${STAGE}
    agents:
      queue: ${STAGE}-queue
"#;

    let mut pipeline = parse(input).unwrap().pipeline;
    pipeline
        .interpolate(&Env::from_map([("STAGE", "prod")], true))
        .unwrap();

    let Step::Group(group) = &pipeline.steps[0] else {
        panic!("not a group step");
    };
    assert_eq!(group.group.as_deref(), Some("Deploy prod"));
    assert_eq!(group.key, "deploy-prod");
    let Step::Command(inner) = &group.steps[0] else {
        panic!("not a command step");
    };
    assert_eq!(inner.command, "deploy prod");
    let agents = inner.remaining.get("agents").unwrap().as_map().unwrap();
    assert_eq!(agents.get("queue"), Some(&Value::from("prod-queue")));
}
