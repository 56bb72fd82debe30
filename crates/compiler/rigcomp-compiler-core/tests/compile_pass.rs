//! Whole-pass behaviour: which layers are rewritten, what they become and what
//! the report says.

use pretty_assertions::assert_eq;
use rigcomp_compiler_core::{
    next_up, optimize_controller, CompileError, CompileReport, CompilerConfig, DirectAccumulator,
    LayerOutcome,
};
use rigcomp_controller_core::{
    AcceptAll, Behaviour, Binding, BindingOracle, BlendKind, Clip, Condition, Controller, Curve,
    KnownBindings, Key, Motion, Origin, Parameter, Provenance, Transition,
};
use rigcomp_test_fixtures::controllers;

fn fixture(name: &str) -> Controller {
    Controller::from_json(&controllers::json(name).unwrap()).unwrap()
}

fn compile(c: &mut Controller) -> CompileReport {
    compile_with(c, &AcceptAll)
}

fn compile_with(c: &mut Controller, oracle: &dyn BindingOracle) -> CompileReport {
    optimize_controller(c, oracle, &mut Provenance::new(), &CompilerConfig::default()).unwrap()
}

fn rejection(report: &CompileReport, layer: &str) -> String {
    match report.outcome(layer) {
        Some(LayerOutcome::Rejected(reason)) => reason.clone(),
        other => panic!("expected '{layer}' to be rejected, got {other:?}"),
    }
}

fn static_clip(c: &mut Controller, name: &str, binding: Binding, value: f32) -> rigcomp_controller_core::MotionId {
    c.add_motion(Motion::Clip(Clip::new(name).with_curve(Curve::constant(binding, value))))
}

/// Two-state bool toggle `Off <-> On` over `param`, with `On` playing `motion`.
fn bool_toggle(c: &mut Controller, name: &str, param: &str, motion: rigcomp_controller_core::MotionId) {
    let l = c.add_layer(name);
    let off = c.add_state(l, "Off", None).unwrap();
    let on = c.add_state(l, "On", Some(motion)).unwrap();
    c.add_transition(l, Transition::between(off, on, vec![Condition::is_true(param)]))
        .unwrap();
    c.add_transition(l, Transition::between(on, off, vec![Condition::is_false(param)]))
        .unwrap();
}

#[test]
fn glow_toggle_becomes_a_gated_tree() {
    let mut c = fixture("glow_toggle");
    let report = compile(&mut c);
    assert_eq!(report.lines(), vec!["Glow - OPTIMIZED".to_string()]);

    let config = CompilerConfig::default();
    assert_eq!(c.layers.len(), 1);
    assert_eq!(c.layers[0].name, config.accumulator_layer_name);
    assert_eq!(c.parameter("RC/One").map(|p| p.default), Some(1.0));

    let sink = DirectAccumulator::locate(&c, &config).unwrap().unwrap();
    let Some(Motion::BlendTree(direct)) = c.motion(sink.tree) else {
        panic!("sink is not a tree");
    };
    assert_eq!(direct.children.len(), 1);
    assert_eq!(direct.children[0].direct_parameter.as_deref(), Some("RC/One"));

    let Some(Motion::BlendTree(gate)) = direct.children[0].motion.and_then(|m| c.motion(m)) else {
        panic!("gate is not a tree");
    };
    assert_eq!(gate.kind, BlendKind::Simple1D { parameter: "Bright".into() });
    let thresholds: Vec<f32> = gate.children.iter().map(|ch| ch.threshold).collect();
    assert_eq!(thresholds, vec![0.0, next_up(0.0)]);
    assert_eq!(gate.children[0].motion, None);
    let Some(Motion::Clip(frozen)) = gate.children[1].motion.and_then(|m| c.motion(m)) else {
        panic!("on side is not a clip");
    };
    assert_eq!(
        frozen.curves,
        vec![Curve::constant(Binding::property("Body", "material._Glow"), 1.0)]
    );
}

#[test]
fn exit_time_leaves_the_layer_untouched() {
    let mut c = fixture("exit_time_toggle");
    let before = c.to_json().unwrap();
    let report = compile(&mut c);
    assert_eq!(
        report.lines(),
        vec!["Glow - Not Optimizing (Transition has exit time)".to_string()]
    );
    assert_eq!(c.to_json().unwrap(), before);
}

#[test]
fn dummy_entry_state_is_collapsed() {
    let mut c = fixture("entry_dummy_toggle");
    let report = compile(&mut c);
    assert_eq!(report.outcome("Hat"), Some(&LayerOutcome::Optimized));
    assert!(c.layer_by_name("Hat").is_none());
}

#[test]
fn three_real_states_are_rejected() {
    let mut c = Controller::new("FX");
    c.add_parameter(Parameter::int("Outfit", 0)).unwrap();
    let l = c.add_layer("Outfit");
    let mut states = Vec::new();
    for (i, name) in ["A", "B", "C"].into_iter().enumerate() {
        let m = static_clip(&mut c, name, Binding::property(name, "m_IsActive"), 1.0);
        let s = c.add_state(l, name, Some(m)).unwrap();
        states.push((i as f32, s));
    }
    for (_, from) in &states {
        for (value, to) in &states {
            if from != to {
                c.add_transition(
                    l,
                    Transition::between(*from, *to, vec![Condition::equals("Outfit", *value)]),
                )
                .unwrap();
            }
        }
    }
    let report = compile(&mut c);
    assert_eq!(rejection(&report, "Outfit"), "Contains 3 states");
}

#[test]
fn dummy_that_can_rest_is_rejected() {
    let mut c = fixture("entry_dummy_toggle");
    // Only leave the entry state when the hat is shown.
    let entry = c.layers[0].default_state;
    let hide = Condition::is_false("Hat");
    c.layers[0]
        .transitions
        .retain(|t| !(t.source_state() == entry && t.conditions[0] == hide));
    let report = compile(&mut c);
    assert_eq!(
        rejection(&report, "Hat"),
        "Entry state 'Entry' can rest without a motion"
    );
}

#[test]
fn mixed_rig_report() {
    let mut c = fixture("mixed_rig");
    let report = compile(&mut c);
    assert_eq!(
        report.lines(),
        vec![
            "Base Idle - OPTIMIZED".to_string(),
            "Blush - OPTIMIZED".to_string(),
            "Mood - OPTIMIZED".to_string(),
            "Wave - Not Optimizing (State 'Waving' animates euler rotations)".to_string(),
            "Ears - Not Optimizing (Transitions use different parameters ('Blush' and 'Other'))"
                .to_string(),
        ]
    );
    let names: Vec<&str> = c.layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Wave", "Ears", "[rigcomp] Direct"]);
}

#[test]
fn bool_gate_weights_the_motion_directly() {
    let mut c = fixture("mixed_rig");
    compile(&mut c);
    let sink = DirectAccumulator::locate(&c, &CompilerConfig::default())
        .unwrap()
        .unwrap();
    let Some(Motion::BlendTree(direct)) = c.motion(sink.tree) else {
        panic!("sink is not a tree");
    };
    let weights: Vec<&str> = direct
        .children
        .iter()
        .filter_map(|ch| ch.direct_parameter.as_deref())
        .collect();
    assert_eq!(weights, vec!["RC/One", "Blush", "RC/One"]);
}

#[test]
fn second_pass_changes_nothing() {
    for name in controllers::keys() {
        let mut c = fixture(&name);
        let mut provenance = Provenance::new();
        let config = CompilerConfig::default();
        optimize_controller(&mut c, &AcceptAll, &mut provenance, &config).unwrap();
        let once = c.to_json().unwrap();
        let report = optimize_controller(&mut c, &AcceptAll, &mut provenance, &config).unwrap();
        assert_eq!(c.to_json().unwrap(), once, "{name}");
        assert_eq!(report.optimized_count(), 0, "{name}");
    }
}

#[test]
fn runtime_weight_control_is_rejected() {
    let mut c = fixture("glow_toggle");
    let glow = c.layers[0].id;
    let fader = c.add_layer("Fader");
    let s = c.add_state(fader, "Fade", None).unwrap();
    c.layer_mut(fader).unwrap().state_mut(s).unwrap().behaviours = vec![Behaviour::LayerControl {
        target: glow,
        goal_weight: 0.0,
    }];
    let report = compile(&mut c);
    assert_eq!(rejection(&report, "Glow"), "Layer weight is controlled at runtime");
    assert_eq!(rejection(&report, "Fader"), "Contains state behaviours");
}

#[test]
fn partial_weight_and_masks_are_rejected() {
    let mut c = fixture("glow_toggle");
    c.layers[0].weight = 0.5;
    assert_eq!(rejection(&compile(&mut c), "Glow"), "Layer weight is 0.5");

    let mut c = fixture("glow_toggle");
    c.layers[0].mask = Some("HandsOnly".into());
    assert_eq!(rejection(&compile(&mut c), "Glow"), "Layer has mask 'HandsOnly'");
}

#[test]
fn shared_binding_with_a_higher_layer_is_rejected() {
    let mut c = fixture("glow_toggle");
    let glow = Binding::property("Body", "material._Glow");
    let m = static_clip(&mut c, "Force", glow, 0.5);
    let top = c.add_layer("Force Glow");
    c.add_state(top, "Force", Some(m)).unwrap();

    let report = compile(&mut c);
    assert_eq!(
        rejection(&report, "Glow"),
        "Shares 'Body.material._Glow' with higher layer 'Force Glow'"
    );
    assert_eq!(report.outcome("Force Glow"), Some(&LayerOutcome::Optimized));

    // the accumulator now holds the shared binding
    let again = compile(&mut c);
    assert_eq!(
        rejection(&again, "Glow"),
        "Shares 'Body.material._Glow' with higher layer '[rigcomp] Direct'"
    );
}

#[test]
fn invalid_bindings_leave_nothing_to_gate() {
    let mut c = fixture("glow_toggle");
    let before = c.to_json().unwrap();
    let report = compile_with(&mut c, &KnownBindings::new());
    assert_eq!(
        rejection(&report, "Glow"),
        "Neither state animates a valid property"
    );
    assert_eq!(c.to_json().unwrap(), before);
}

#[test]
fn empty_constant_layer_is_removed() {
    let mut c = Controller::new("FX");
    let l = c.add_layer("Nothing");
    c.add_state(l, "Idle", None).unwrap();
    let report = compile(&mut c);
    assert_eq!(report.outcome("Nothing"), Some(&LayerOutcome::Optimized));
    assert!(c.layers.is_empty());
    assert!(c.parameters.is_empty());
}

#[test]
fn conjunctive_conditions_are_rejected() {
    let mut c = fixture("glow_toggle");
    c.add_parameter(Parameter::bool("Extra", true)).unwrap();
    c.layers[0].transitions[0]
        .conditions
        .push(Condition::is_true("Extra"));
    assert_eq!(
        rejection(&compile(&mut c), "Glow"),
        "Transition into 'On' has 2 conditions"
    );
}

#[test]
fn duplicate_conditions_count_once() {
    let mut c = fixture("glow_toggle");
    let dup = c.layers[0].transitions[0].conditions[0].clone();
    c.layers[0].transitions[0].conditions.push(dup);
    assert_eq!(compile(&mut c).outcome("Glow"), Some(&LayerOutcome::Optimized));
}

#[test]
fn non_complementary_thresholds_are_rejected() {
    let mut c = fixture("glow_toggle");
    c.layers[0].transitions[1].conditions[0].threshold = 3.0;
    assert_eq!(
        rejection(&compile(&mut c), "Glow"),
        "Conditions on 'Bright' are not exact opposites"
    );
}

#[test]
fn mirrored_states_are_rejected() {
    let mut c = fixture("glow_toggle");
    c.layers[0].states[1].mirror_parameter = Some("Bright".into());
    assert_eq!(
        rejection(&compile(&mut c), "Glow"),
        "State 'On' is mirrored by a parameter"
    );
}

#[test]
fn euler_curves_are_fine_on_generated_layers() {
    let mut c = Controller::new("FX");
    c.add_parameter(Parameter::bool("Tilt", false)).unwrap();
    let m = static_clip(&mut c, "Tilt", Binding::property("Head", "localEulerAngles.x"), 15.0);
    bool_toggle(&mut c, "Tilt", "Tilt", m);
    let config = CompilerConfig::default();

    let mut user = c.clone();
    let report = optimize_controller(&mut user, &AcceptAll, &mut Provenance::new(), &config).unwrap();
    assert_eq!(rejection(&report, "Tilt"), "State 'On' animates euler rotations");

    let mut provenance = Provenance::new();
    provenance.mark_layer(c.layers[0].id, Origin::GeneratedThisPass);
    let report = optimize_controller(&mut c, &AcceptAll, &mut provenance, &config).unwrap();
    assert_eq!(report.outcome("Tilt"), Some(&LayerOutcome::Optimized));
}

#[test]
fn animated_clips_need_a_usable_speed() {
    let mut c = Controller::new("FX");
    c.add_parameter(Parameter::bool("Pop", false)).unwrap();
    let m = c.add_motion(Motion::Clip(Clip::new("Pop").with_curve(Curve {
        binding: Binding::property("Body", "blendShape.Pop"),
        keys: vec![
            Key { time: 0.0, value: 0.0 },
            Key { time: 2.0 / 60.0, value: 100.0 },
        ],
    })));
    bool_toggle(&mut c, "Pop", "Pop", m);

    let mut fast = c.clone();
    fast.layers[0].states[1].speed = 2.0;
    assert_eq!(
        rejection(&compile(&mut fast), "Pop"),
        "Clip 'Pop' plays at speed 2"
    );

    assert_eq!(compile(&mut c).outcome("Pop"), Some(&LayerOutcome::Optimized));
}

#[test]
fn malformed_accumulator_aborts_the_pass() {
    let mut c = fixture("glow_toggle");
    c.add_layer(CompilerConfig::default().accumulator_layer_name);
    let err = optimize_controller(&mut c, &AcceptAll, &mut Provenance::new(), &CompilerConfig::default())
        .unwrap_err();
    assert!(matches!(err, CompileError::Invariant(_)));
    assert!(!err.is_recoverable());
}

#[test]
fn custom_prefix_and_sink_name() {
    let config = CompilerConfig {
        param_prefix: "Opt/".into(),
        accumulator_layer_name: "Flattened".into(),
        ..CompilerConfig::default()
    };
    let mut c = fixture("mixed_rig");
    optimize_controller(&mut c, &AcceptAll, &mut Provenance::new(), &config).unwrap();
    assert!(c.parameter("Opt/One").is_some());
    assert!(c.layer_by_name("Flattened").is_some());
}
