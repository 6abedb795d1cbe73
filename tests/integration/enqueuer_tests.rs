//! Integration tests for the liveness trace.
//!
//! These build small program graphs by hand and verify the engine's
//! observable properties: reachability closure, dynamic-dispatch
//! precision, conditional-rule activation and determinism.

use treeshake::diagnostics::CollectingSink;
use treeshake::graph::{AccessFlags, Invoke, InvokeKind, ProgramGraph, TracedReferences};
use treeshake::rules::{ClassPattern, Condition, MemberKind, MemberPattern, Rule, RuleKind};
use treeshake::shaking::{Enqueuer, RootSetBuilder};
use treeshake::{CancellationToken, Reference, ShakeError, ShakeOptions};

fn method_pattern(name: &str) -> MemberPattern {
    MemberPattern::new(name, None, MemberKind::Method).unwrap()
}

fn keep_method(class: &str, method: &str) -> Rule {
    Rule::keep_members(class, vec![method_pattern(method)]).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn run(
    graph: &ProgramGraph,
    rules: &[Rule],
) -> (treeshake::LivenessResult, CollectingSink) {
    init_tracing();
    let options = ShakeOptions::default();
    let mut sink = CollectingSink::new();
    let root_set = RootSetBuilder::new(graph, &options)
        .build(rules, &mut sink)
        .expect("root set should build");
    let result = Enqueuer::new(graph, &options, &mut sink)
        .trace(&root_set)
        .expect("trace should complete");
    (result, sink)
}

/// App.main -> Util.helper -> new Widget; Dead is unreferenced.
fn app_graph() -> ProgramGraph {
    let mut b = ProgramGraph::builder();
    let app = b.add_class("com.example.App", AccessFlags::default(), None, &[]);
    let util = b.add_class("com.example.Util", AccessFlags::default(), None, &[]);
    let widget = b.add_class("com.example.Widget", AccessFlags::default(), None, &[]);
    b.add_class("com.example.Dead", AccessFlags::default(), None, &[]);

    b.add_method(
        util,
        "helper",
        "()V",
        AccessFlags::static_(),
        TracedReferences::default(),
    );
    let widget_init = b.add_method(
        widget,
        "<init>",
        "()V",
        AccessFlags::default(),
        TracedReferences::default(),
    );
    // Register the instantiation after the constructor exists, the way the
    // bytecode reader hands bodies over.
    let util_refs = TracedReferences {
        instantiations: vec![widget],
        invokes: vec![Invoke {
            target: widget_init,
            kind: InvokeKind::Direct,
        }],
        ..TracedReferences::default()
    };
    b.add_method(util, "helper2", "()V", AccessFlags::static_(), util_refs);
    // helper delegates to helper2 so the chain is two invokes deep
    let helper2 = b.method_ref("com.example.Util", "helper2", "()V");
    let app_refs = TracedReferences {
        invokes: vec![
            Invoke {
                target: b.method_ref("com.example.Util", "helper", "()V"),
                kind: InvokeKind::Static,
            },
            Invoke {
                target: helper2,
                kind: InvokeKind::Static,
            },
        ],
        ..TracedReferences::default()
    };
    b.add_method(app, "main", "([Ljava/lang/String;)V", AccessFlags::static_(), app_refs);
    b.build()
}

#[test]
fn test_reachability_from_single_root() {
    let graph = app_graph();
    let (result, _) = run(&graph, &[keep_method("com.example.App", "main")]);

    for name in ["com.example.App", "com.example.Util", "com.example.Widget"] {
        let class = graph.lookup_class(name).unwrap();
        assert!(result.is_class_live(class), "{name} should be live");
    }

    let dead = graph.lookup_class("com.example.Dead").unwrap();
    assert!(!result.is_class_live(dead));
    assert!(result.pruned_types().contains(&dead));
    assert!(result.is_instantiated(graph.lookup_class("com.example.Widget").unwrap()));
}

#[test]
fn test_soundness_every_root_is_live() {
    let graph = app_graph();
    let options = ShakeOptions::default();
    let mut sink = CollectingSink::new();
    let rules = [keep_method("com.example.App", "main")];
    let root_set = RootSetBuilder::new(&graph, &options)
        .build(&rules, &mut sink)
        .unwrap();
    let roots: Vec<Reference> = root_set.roots.iter().map(|(r, _)| *r).collect();
    let result = Enqueuer::new(&graph, &options, &mut sink)
        .trace(&root_set)
        .unwrap();

    for root in roots {
        assert!(result.is_live(root), "root {root:?} must be live");
    }
}

#[test]
fn test_owner_implication() {
    let graph = app_graph();
    let (result, _) = run(&graph, &[keep_method("com.example.App", "main")]);

    for &method in result.live_methods() {
        assert!(
            result.is_class_live(graph.method_owner(method)),
            "live method without live owner"
        );
    }
    for &field in result.live_fields() {
        assert!(result.is_class_live(graph.field_owner(field)));
    }
}

/// Virtual dispatch: only overrides on instantiated receivers become live.
fn shapes_graph() -> ProgramGraph {
    let mut b = ProgramGraph::builder();
    let shape = b.add_class("shapes.Shape", AccessFlags::abstract_(), None, &[]);
    let circle = b.add_class("shapes.Circle", AccessFlags::default(), Some("shapes.Shape"), &[]);
    let square = b.add_class("shapes.Square", AccessFlags::default(), Some("shapes.Shape"), &[]);
    let main = b.add_class("shapes.Main", AccessFlags::default(), None, &[]);

    b.add_method(shape, "area", "()D", AccessFlags::abstract_(), TracedReferences::default());
    b.add_method(circle, "area", "()D", AccessFlags::default(), TracedReferences::default());
    b.add_method(square, "area", "()D", AccessFlags::default(), TracedReferences::default());
    let circle_init = b.add_method(
        circle,
        "<init>",
        "()V",
        AccessFlags::default(),
        TracedReferences::default(),
    );

    let area_on_shape = b.method_ref("shapes.Shape", "area", "()D");
    let refs = TracedReferences {
        instantiations: vec![circle],
        invokes: vec![
            Invoke {
                target: circle_init,
                kind: InvokeKind::Direct,
            },
            Invoke {
                target: area_on_shape,
                kind: InvokeKind::Virtual,
            },
        ],
        ..TracedReferences::default()
    };
    b.add_method(main, "run", "()V", AccessFlags::default(), refs);
    b.build()
}

#[test]
fn test_virtual_dispatch_only_live_receivers() {
    let graph = shapes_graph();
    let (result, _) = run(&graph, &[keep_method("shapes.Main", "run")]);

    let circle = graph.lookup_class("shapes.Circle").unwrap();
    let square = graph.lookup_class("shapes.Square").unwrap();
    let shape = graph.lookup_class("shapes.Shape").unwrap();

    let area_sig = {
        let shape_area = graph.class_def(shape).unwrap().methods[0];
        graph.signature_of(shape_area)
    };
    let circle_area = graph.declared_method(circle, area_sig).unwrap();
    let square_area = graph.declared_method(square, area_sig).unwrap();
    let shape_area = graph.declared_method(shape, area_sig).unwrap();

    assert!(result.is_method_live(circle_area));
    assert!(!result.is_method_live(square_area), "Square is never instantiated");
    assert!(
        !result.is_method_live(shape_area),
        "Shape itself is never instantiated and its implementation is abstract"
    );
    assert!(result.is_class_live(shape), "declared receiver type stays live");
    assert!(!result.is_class_live(square));
    assert!(result.pruned_types().contains(&square));
}

#[test]
fn test_virtual_dispatch_inherited_implementation() {
    // Leaf never overrides; the inherited Base.impl is the dispatch target.
    let mut b = ProgramGraph::builder();
    let base = b.add_class("v.Base", AccessFlags::default(), None, &[]);
    let leaf = b.add_class("v.Leaf", AccessFlags::default(), Some("v.Base"), &[]);
    let main = b.add_class("v.Main", AccessFlags::default(), None, &[]);
    let base_impl = b.add_method(base, "impl", "()V", AccessFlags::default(), TracedReferences::default());
    let leaf_init = b.add_method(leaf, "<init>", "()V", AccessFlags::default(), TracedReferences::default());

    let call = b.method_ref("v.Base", "impl", "()V");
    let refs = TracedReferences {
        instantiations: vec![leaf],
        invokes: vec![
            Invoke { target: leaf_init, kind: InvokeKind::Direct },
            Invoke { target: call, kind: InvokeKind::Virtual },
        ],
        ..TracedReferences::default()
    };
    b.add_method(main, "run", "()V", AccessFlags::default(), refs);
    let graph = b.build();

    let (result, _) = run(&graph, &[keep_method("v.Main", "run")]);
    assert!(result.is_method_live(base_impl));
}

#[test]
fn test_obligation_applies_to_later_instantiation() {
    // The virtual call is traced before any receiver exists; the
    // instantiation happens in a method reached afterwards.
    let mut b = ProgramGraph::builder();
    let base = b.add_class("l.Base", AccessFlags::default(), None, &[]);
    let sub = b.add_class("l.Sub", AccessFlags::default(), Some("l.Base"), &[]);
    let main = b.add_class("l.Main", AccessFlags::default(), None, &[]);
    b.add_method(base, "work", "()V", AccessFlags::default(), TracedReferences::default());
    let sub_work = b.add_method(sub, "work", "()V", AccessFlags::default(), TracedReferences::default());
    let sub_init = b.add_method(sub, "<init>", "()V", AccessFlags::default(), TracedReferences::default());

    let make_refs = TracedReferences {
        instantiations: vec![sub],
        invokes: vec![Invoke { target: sub_init, kind: InvokeKind::Direct }],
        ..TracedReferences::default()
    };
    let make = b.add_method(main, "make", "()V", AccessFlags::default(), make_refs);

    let call = b.method_ref("l.Base", "work", "()V");
    let run_refs = TracedReferences {
        invokes: vec![
            // Virtual call first, instantiation discovered later.
            Invoke { target: call, kind: InvokeKind::Virtual },
            Invoke { target: make, kind: InvokeKind::Static },
        ],
        ..TracedReferences::default()
    };
    b.add_method(main, "run", "()V", AccessFlags::default(), run_refs);
    let graph = b.build();

    let (result, _) = run(&graph, &[keep_method("l.Main", "run")]);
    assert!(result.is_method_live(sub_work));
}

#[test]
fn test_conditional_rule_activates_after_precondition() {
    let mut b = ProgramGraph::builder();
    let plugin = b.add_class("p.Plugin", AccessFlags::default(), None, &[]);
    let register = b.add_method(
        plugin,
        "register",
        "()V",
        AccessFlags::default(),
        TracedReferences::default(),
    );
    let main = b.add_class("p.Main", AccessFlags::default(), None, &[]);
    let refs = TracedReferences {
        types: vec![plugin],
        ..TracedReferences::default()
    };
    b.add_method(main, "run", "()V", AccessFlags::default(), refs);
    let graph = b.build();

    let conditional = Rule::keep_if(
        Condition {
            class_pattern: ClassPattern::new("p.Plugin").unwrap(),
            members: Vec::new(),
        },
        "p.Plugin",
        vec![method_pattern("register")],
    )
    .unwrap();

    // Plugin becomes live through an unrelated reference; the conditional
    // rule then pulls register() in.
    let (result, _) = run(
        &graph,
        &[keep_method("p.Main", "run"), conditional.clone()],
    );
    assert!(result.is_method_live(register));

    // Without the unrelated reference the precondition never holds.
    let (result, _) = run(&graph, &[conditional]);
    assert!(!result.is_method_live(register));
    assert!(!result.is_class_live(plugin));
}

#[test]
fn test_conditional_rule_chain_converges() {
    // rule0: A live -> keep B.b; rule1: B live -> keep C.c. Rooting A must
    // cascade through two activation sweeps and terminate.
    let mut b = ProgramGraph::builder();
    let a = b.add_class("c.A", AccessFlags::default(), None, &[]);
    let bb = b.add_class("c.B", AccessFlags::default(), None, &[]);
    let cc = b.add_class("c.C", AccessFlags::default(), None, &[]);
    b.add_method(a, "a", "()V", AccessFlags::default(), TracedReferences::default());
    let b_method = b.add_method(bb, "b", "()V", AccessFlags::default(), TracedReferences::default());
    let c_method = b.add_method(cc, "c", "()V", AccessFlags::default(), TracedReferences::default());
    let graph = b.build();

    let rules = vec![
        Rule::keep_class("c.A").unwrap(),
        Rule::keep_if(
            Condition {
                class_pattern: ClassPattern::new("c.A").unwrap(),
                members: Vec::new(),
            },
            "c.B",
            vec![method_pattern("b")],
        )
        .unwrap(),
        Rule::keep_if(
            Condition {
                class_pattern: ClassPattern::new("c.B").unwrap(),
                members: Vec::new(),
            },
            "c.C",
            vec![method_pattern("c")],
        )
        .unwrap(),
    ];

    let (result, _) = run(&graph, &rules);
    assert!(result.is_method_live(b_method));
    assert!(result.is_method_live(c_method));
}

#[test]
fn test_conditional_rule_cycle_converges() {
    // Mutually referencing rules: A live -> keep B, B live -> keep A.
    // Rooting A must reach a fixpoint instead of re-activating forever.
    let mut b = ProgramGraph::builder();
    b.add_class("y.A", AccessFlags::default(), None, &[]);
    let class_b = b.add_class("y.B", AccessFlags::default(), None, &[]);
    let graph = b.build();

    let rules = vec![
        Rule::keep_class("y.A").unwrap(),
        Rule::keep_if(
            Condition {
                class_pattern: ClassPattern::new("y.A").unwrap(),
                members: Vec::new(),
            },
            "y.B",
            Vec::new(),
        )
        .unwrap(),
        Rule::keep_if(
            Condition {
                class_pattern: ClassPattern::new("y.B").unwrap(),
                members: Vec::new(),
            },
            "y.A",
            Vec::new(),
        )
        .unwrap(),
    ];

    let (result, _) = run(&graph, &rules);
    assert!(result.is_class_live(class_b));
}

#[test]
fn test_order_independence() {
    let graph = app_graph();
    let rules_forward = [
        keep_method("com.example.App", "main"),
        Rule::keep_class("com.example.Widget").unwrap(),
    ];
    let rules_reverse = [
        Rule::keep_class("com.example.Widget").unwrap(),
        keep_method("com.example.App", "main"),
    ];

    let (forward, _) = run(&graph, &rules_forward);
    let (reverse, _) = run(&graph, &rules_reverse);

    assert_eq!(forward.live_classes(), reverse.live_classes());
    assert_eq!(forward.live_methods(), reverse.live_methods());
    assert_eq!(forward.live_fields(), reverse.live_fields());
}

#[test]
fn test_closure_static_targets_live() {
    let graph = app_graph();
    let (result, _) = run(&graph, &[keep_method("com.example.App", "main")]);

    for &method in result.live_methods() {
        let def = graph.method_def(method).unwrap();
        for invoke in &def.references.invokes {
            if !invoke.kind.is_dynamic() {
                let target = graph.resolve_method(invoke.target).unwrap();
                assert!(result.is_method_live(target), "closure violated");
            }
        }
    }
}

#[test]
fn test_unresolved_reference_warns_but_completes() {
    let mut b = ProgramGraph::builder();
    let app = b.add_class("u.App", AccessFlags::default(), None, &[]);
    let missing = b.method_ref("u.Missing", "gone", "()V");
    let refs = TracedReferences {
        invokes: vec![Invoke {
            target: missing,
            kind: InvokeKind::Static,
        }],
        ..TracedReferences::default()
    };
    b.add_method(app, "main", "()V", AccessFlags::default(), refs);
    let graph = b.build();

    let (result, sink) = run(&graph, &[keep_method("u.App", "main")]);
    assert!(result.is_class_live(graph.lookup_class("u.App").unwrap()));
    assert!(sink
        .warnings()
        .any(|d| d.message.contains("unresolved reference")));
}

#[test]
fn test_unresolved_reference_fatal_in_strict_mode() {
    let mut b = ProgramGraph::builder();
    let app = b.add_class("u.App", AccessFlags::default(), None, &[]);
    let missing = b.method_ref("u.Missing", "gone", "()V");
    let refs = TracedReferences {
        invokes: vec![Invoke {
            target: missing,
            kind: InvokeKind::Static,
        }],
        ..TracedReferences::default()
    };
    b.add_method(app, "main", "()V", AccessFlags::default(), refs);
    let graph = b.build();

    let options = ShakeOptions::strict();
    let mut sink = CollectingSink::new();
    let root_set = RootSetBuilder::new(&graph, &options)
        .build(&[keep_method("u.App", "main")], &mut sink)
        .unwrap();
    let result = Enqueuer::new(&graph, &options, &mut sink).trace(&root_set);
    assert!(matches!(result, Err(ShakeError::UnresolvedReference { .. })));
}

#[test]
fn test_library_references_are_not_traced() {
    let mut b = ProgramGraph::builder();
    b.add_library_class("java.lang.Object");
    let app = b.add_class("lib.App", AccessFlags::default(), None, &[]);
    let to_string = b.method_ref("java.lang.Object", "toString", "()Ljava/lang/String;");
    let refs = TracedReferences {
        invokes: vec![Invoke {
            target: to_string,
            kind: InvokeKind::Virtual,
        }],
        ..TracedReferences::default()
    };
    b.add_method(app, "main", "()V", AccessFlags::default(), refs);
    let graph = b.build();

    let (result, sink) = run(&graph, &[keep_method("lib.App", "main")]);
    assert!(result.is_library_live(Reference::Method(to_string)));
    assert!(!sink.warnings().any(|d| d.message.contains("unresolved")));
}

/// Sub extends a library class and never overrides toString; the virtual
/// call resolves through the open library, not to nothing.
fn inherited_library_call_graph(
    b: &mut treeshake::ProgramGraphBuilder,
) -> treeshake::graph::MethodId {
    b.add_library_class("java.lang.Object");
    let sub = b.add_class("inh.Sub", AccessFlags::default(), Some("java.lang.Object"), &[]);
    let sub_init = b.add_method(sub, "<init>", "()V", AccessFlags::default(), TracedReferences::default());
    let main = b.add_class("inh.Main", AccessFlags::default(), None, &[]);

    let to_string = b.method_ref("inh.Sub", "toString", "()Ljava/lang/String;");
    let refs = TracedReferences {
        instantiations: vec![sub],
        invokes: vec![
            Invoke { target: sub_init, kind: InvokeKind::Direct },
            Invoke { target: to_string, kind: InvokeKind::Virtual },
        ],
        ..TracedReferences::default()
    };
    b.add_method(main, "run", "()V", AccessFlags::default(), refs);
    to_string
}

#[test]
fn test_inherited_library_method_is_not_unresolved() {
    let mut b = ProgramGraph::builder();
    let to_string = inherited_library_call_graph(&mut b);
    let graph = b.build();

    let (result, sink) = run(&graph, &[keep_method("inh.Main", "run")]);
    assert!(!sink.warnings().any(|d| d.message.contains("unresolved")));
    assert!(result.is_library_live(Reference::Method(to_string)));
    assert!(result.is_class_live(graph.lookup_class("inh.Sub").unwrap()));
}

#[test]
fn test_inherited_library_method_allowed_in_strict_mode() {
    let mut b = ProgramGraph::builder();
    inherited_library_call_graph(&mut b);
    let graph = b.build();

    let options = ShakeOptions::strict();
    let mut sink = CollectingSink::new();
    let root_set = RootSetBuilder::new(&graph, &options)
        .build(&[keep_method("inh.Main", "run")], &mut sink)
        .unwrap();
    let result = Enqueuer::new(&graph, &options, &mut sink).trace(&root_set);
    assert!(result.is_ok(), "calls landing in the library are valid input");
}

#[test]
fn test_cancellation_aborts_run() {
    let graph = app_graph();
    let options = ShakeOptions::default();
    let mut sink = CollectingSink::new();
    let root_set = RootSetBuilder::new(&graph, &options)
        .build(&[keep_method("com.example.App", "main")], &mut sink)
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let result = Enqueuer::new(&graph, &options, &mut sink)
        .with_cancellation(token)
        .trace(&root_set);
    assert!(matches!(result, Err(ShakeError::Cancelled)));
}

#[test]
fn test_assumed_constant_field_read_not_traced() {
    fn build(field_writes: bool) -> (ProgramGraph, treeshake::graph::FieldId) {
        let mut b = ProgramGraph::builder();
        let config = b.add_class("a.Config", AccessFlags::default(), None, &[]);
        let flag = b.add_field(config, "FLAG", None, AccessFlags::static_());
        let main = b.add_class("a.Main", AccessFlags::default(), None, &[]);
        let refs = if field_writes {
            TracedReferences {
                field_writes: vec![flag],
                ..TracedReferences::default()
            }
        } else {
            TracedReferences {
                field_reads: vec![flag],
                ..TracedReferences::default()
            }
        };
        b.add_method(main, "run", "()V", AccessFlags::default(), refs);
        (b.build(), flag)
    }

    let assume = || Rule {
        kind: RuleKind::AssumeValues,
        class_pattern: ClassPattern::new("a.Config").unwrap(),
        members: vec![MemberPattern::new("FLAG", None, MemberKind::Field).unwrap()],
        condition: None,
        origin: None,
    };

    // A read of an assumed-constant field is replaced downstream, so it
    // does not keep the field.
    let (graph, flag) = build(false);
    let (result, _) = run(&graph, &[keep_method("a.Main", "run"), assume()]);
    assert!(!result.is_field_live(flag));

    // A write is an effect the assumption says nothing about.
    let (graph, flag) = build(true);
    let (result, _) = run(&graph, &[keep_method("a.Main", "run"), assume()]);
    assert!(result.is_field_live(flag));
}

#[test]
fn test_static_initializer_enqueued_with_class() {
    let mut b = ProgramGraph::builder();
    let app = b.add_class("s.App", AccessFlags::default(), None, &[]);
    let config = b.add_class("s.Config", AccessFlags::default(), None, &[]);
    b.add_method(config, "noise", "()V", AccessFlags::default(), TracedReferences::default());
    let clinit_refs = TracedReferences {
        types: vec![config],
        ..TracedReferences::default()
    };
    let clinit = b.add_method(app, "<clinit>", "()V", AccessFlags::static_(), clinit_refs);
    let graph = b.build();

    let (result, _) = run(&graph, &[Rule::keep_class("s.App").unwrap()]);
    assert!(result.is_method_live(clinit));
    assert!(result.is_class_live(config));
}

#[test]
fn test_why_kept_path_reaches_rule() {
    let graph = app_graph();
    let options = ShakeOptions::default();
    let rules = [keep_method("com.example.App", "main")];
    let mut sink = CollectingSink::new();
    let root_set = RootSetBuilder::new(&graph, &options)
        .build(&rules, &mut sink)
        .unwrap();
    let result = Enqueuer::new(&graph, &options, &mut sink)
        .with_kept_graph()
        .trace(&root_set)
        .unwrap();

    let widget = graph.lookup_class("com.example.Widget").unwrap();
    let path = result
        .kept_graph()
        .unwrap()
        .explain(Reference::Class(widget))
        .expect("Widget retention should have a recorded path");
    let rendered = path.render(&graph, &rules);
    assert!(rendered.first().unwrap().contains("rule #0"));
    assert!(rendered.last().unwrap().contains("Widget"));
}
