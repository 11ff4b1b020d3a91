//! End-to-end tests across the relay workspace: documents in, scans
//! through the driver, out through the wire/validator/codegen/debug
//! boundaries.

use relay_codegen::{Backend, CBackend};
use relay_debug::{BreakCondition, DebugSession, SessionStatus, StopReason};
use relay_engine::{Driver, Dt, RewindPolicy};
use relay_model::{
    AddressMap, CmpOp, CountDirection, EdgeKind, Expr, HwAddress, Operand, ProgramBuilder,
    ProgramDoc, Region, TargetProfile, Value, ValueKind,
};
use relay_tests::{Harness, SCAN};
use relay_validate::{validate, TargetCaps, ViolationKind};
use relay_wire::{Link, SoftController};

const CONVEYOR: &str = r#"{
    "tags": [
        { "name": "start", "kind": "Bool" },
        { "name": "stop", "kind": "Bool" },
        { "name": "running", "kind": "Bool" },
        { "name": "jam", "kind": "Bool" },
        { "name": "warmup_done", "kind": "Bool" },
        { "name": "motor", "kind": "Bool" }
    ],
    "rungs": [
        {
            "when": { "tag": "start" },
            "body": [ { "latch": { "tag": "running" } } ]
        },
        {
            "when": { "any": [ { "tag": "stop" }, { "tag": "jam" } ] },
            "body": [ { "reset": { "tag": "running" } } ]
        },
        {
            "when": { "tag": "running" },
            "body": [
                { "timer": { "tag": "warmup_done", "preset": 50, "kind": "OnDelay" } }
            ]
        },
        {
            "when": { "all": [ { "tag": "running" }, { "tag": "warmup_done" } ] },
            "body": [ { "out": { "tag": "motor" } } ]
        }
    ]
}"#;

#[test]
fn conveyor_start_warmup_stop_cycle() {
    let mut h = Harness::from_json(CONVEYOR);

    h.set("start", true);
    h.step();
    assert!(h.bool_tag("running"));
    assert!(!h.bool_tag("motor"));
    h.set("start", false);

    // 50 ms warmup at 10 ms scans; the motor rung sees the done bit one
    // scan after the timer raises it.
    h.run(5);
    assert!(h.bool_tag("warmup_done"));
    h.step();
    assert!(h.bool_tag("motor"));

    h.set("jam", true);
    h.step();
    assert!(!h.bool_tag("running"));

    h.set("jam", false);
    h.run(2);
    assert!(!h.bool_tag("motor"));
    // On-delay timer dropped its accumulator once running fell.
    let warmup = h.tag("warmup_done");
    assert_eq!(h.driver().current().state(warmup).unwrap().timer_accum, 0);
    assert!(!h.bool_tag("warmup_done"));
}

#[test]
fn stepping_twice_from_identical_state_is_identical() {
    let build = || Harness::from_json(CONVEYOR);
    let mut a = build();
    let mut b = build();
    for h in [&mut a, &mut b] {
        h.set("start", true);
        h.run(7);
    }
    for name in ["start", "stop", "running", "jam", "warmup_done", "motor"] {
        assert_eq!(a.value(name), b.value(name), "{name} diverged");
    }
    assert_eq!(
        a.driver().last_report().unwrap().fires,
        b.driver().last_report().unwrap().fires
    );
}

#[test]
fn rung_two_condition_does_not_see_rung_one_write() {
    let mut h = Harness::from_json(
        r#"{
        "tags": [
            { "name": "button", "kind": "Bool", "init": { "Bool": true } },
            { "name": "x", "kind": "Bool" },
            { "name": "light", "kind": "Bool" }
        ],
        "rungs": [
            {
                "when": { "tag": "button" },
                "body": [ { "write": { "tag": "x", "value": { "const": { "Bool": true } } } } ]
            },
            {
                "when": { "tag": "x" },
                "body": [ { "out": { "tag": "light" } } ]
            }
        ]
    }"#,
    );

    h.step();
    assert!(h.bool_tag("x"));
    assert!(!h.bool_tag("light"));
    h.step();
    assert!(h.bool_tag("light"));
}

#[test]
fn one_shot_pending_clears_while_the_value_persists() {
    let mut h = Harness::from_json(
        r#"{
        "tags": [
            { "name": "go", "kind": "Bool", "init": { "Bool": true } },
            { "name": "n", "kind": "U16" }
        ],
        "rungs": [
            {
                "when": { "tag": "go" },
                "body": [ { "write": { "tag": "n", "value": { "const": { "U16": 42 } } } } ]
            }
        ]
    }"#,
    );

    h.step();
    let n = h.tag("n");
    assert_eq!(h.driver().last_report().unwrap().one_shot_writes, vec![n]);
    assert!(!h.driver().current().state(n).unwrap().one_shot_pending);

    h.set("go", false);
    h.run(3);
    assert_eq!(h.value("n"), Value::U16(42));
}

#[test]
fn forced_tag_holds_against_program_logic_until_released() {
    let mut h = Harness::from_json(
        r#"{
        "tags": [
            { "name": "lamp", "kind": "Bool" }
        ],
        "rungs": [
            { "when": { "all": [] }, "body": [ { "out": { "tag": "lamp" } } ] }
        ]
    }"#,
    );

    h.force("lamp", Value::Bool(false));
    h.run(4);
    assert!(!h.bool_tag("lamp"));

    h.remove_force("lamp");
    assert!(h.bool_tag("lamp"));
}

#[test]
fn micro16_down_counter_wraps_zero_to_65535() {
    // Declared width under test: micro16, 16-bit counter registers.
    let mut b = ProgramBuilder::new(TargetProfile::micro16());
    let pulse = b.declare("pulse", ValueKind::Bool).unwrap();
    let empty = b.declare("empty", ValueKind::Bool).unwrap();
    b.begin_rung(Expr::Tag(pulse)).unwrap();
    b.counter(empty, 60_000, EdgeKind::Rising, CountDirection::Down)
        .unwrap();
    b.end_rung().unwrap();
    let mut h = Harness::from_program(b.finish().unwrap());

    h.set("pulse", true);
    h.step();
    // Exact wrap at the declared width, not saturation.
    assert_eq!(
        h.driver().current().state(empty).unwrap().counter_count,
        65_535
    );
    assert!(h.bool_tag("empty"));
}

#[test]
fn micro16_up_counter_increments_past_65535_to_zero() {
    // Declared width under test: micro16, 16-bit counter registers.
    // 65_536 rising edges walk the register all the way around.
    let mut b = ProgramBuilder::new(TargetProfile::micro16());
    let pulse = b.declare("pulse", ValueKind::Bool).unwrap();
    let full = b.declare("full", ValueKind::Bool).unwrap();
    b.begin_rung(Expr::Tag(pulse)).unwrap();
    b.counter(full, 60_000, EdgeKind::Rising, CountDirection::Up)
        .unwrap();
    b.end_rung().unwrap();
    let mut h = Harness::from_program(b.finish().unwrap());

    for _ in 0..65_535 {
        h.set("pulse", true);
        h.step();
        h.set("pulse", false);
        h.step();
    }
    assert_eq!(
        h.driver().current().state(full).unwrap().counter_count,
        65_535
    );
    assert!(h.bool_tag("full"));

    h.set("pulse", true);
    h.step();
    assert_eq!(h.driver().current().state(full).unwrap().counter_count, 0);
    assert!(!h.bool_tag("full"));
}

#[test]
fn branch_truth_table_through_a_document() {
    for (c, b, expect_branch, expect_rung) in [
        (false, false, false, false),
        (false, true, false, true),
        (true, false, false, true),
        (true, true, true, true),
    ] {
        let mut h = Harness::from_json(
            r#"{
            "tags": [
                { "name": "c", "kind": "Bool" },
                { "name": "b", "kind": "Bool" },
                { "name": "in_branch", "kind": "Bool" },
                { "name": "on_rung", "kind": "Bool" }
            ],
            "rungs": [
                {
                    "when": { "tag": "c" },
                    "body": [
                        { "branch": { "when": { "tag": "b" }, "body": [ { "out": { "tag": "in_branch" } } ] } },
                        { "out": { "tag": "on_rung" } }
                    ]
                }
            ]
        }"#,
        );
        h.set("c", c);
        h.set("b", b);
        h.step();
        assert_eq!(h.bool_tag("in_branch"), expect_branch, "c={c} b={b}");
        assert_eq!(h.bool_tag("on_rung"), expect_rung, "c={c} b={b}");
    }
}

#[test]
fn branch_alone_energizes_the_rung_body() {
    // Parallel path: branch condition true while the rung condition is
    // false still energizes instructions after the branch.
    let mut h = Harness::from_json(
        r#"{
        "tags": [
            { "name": "c", "kind": "Bool" },
            { "name": "b", "kind": "Bool", "init": { "Bool": true } },
            { "name": "on_rung", "kind": "Bool" }
        ],
        "rungs": [
            {
                "when": { "tag": "c" },
                "body": [
                    { "branch": { "when": { "tag": "b" }, "body": [] } },
                    { "out": { "tag": "on_rung" } }
                ]
            }
        ]
    }"#,
    );
    h.step();
    assert!(h.bool_tag("on_rung"));
}

#[test]
fn rewind_truncate_rewrites_history() {
    let mut h = Harness::from_json(CONVEYOR);
    h.run(6);
    assert_eq!(h.driver().history().len(), 7);

    h.driver_mut().rewind(2).unwrap();
    h.set("start", true);
    h.step();

    assert_eq!(h.driver().history().len(), 4);
    assert_eq!(h.driver().current().scan_index(), 3);
    assert!(h.driver().forks().is_empty());
    assert!(h.bool_tag("running"));
}

#[test]
fn rewind_fork_shelves_the_other_timeline() {
    let mut b = ProgramBuilder::new(TargetProfile::generic());
    let go = b.declare("go", ValueKind::Bool).unwrap();
    let l = b.declare("l", ValueKind::Bool).unwrap();
    b.begin_rung(Expr::Tag(go)).unwrap();
    b.latch(l).unwrap();
    b.end_rung().unwrap();
    let program = b.finish().unwrap();

    let mut driver = Driver::new(program, RewindPolicy::Fork);
    driver.force(go, Value::Bool(true)).unwrap();
    driver.run(3, SCAN).unwrap();
    assert_eq!(driver.current().read(l).unwrap(), Value::Bool(true));

    driver.rewind(1).unwrap();
    driver.remove_force(go).unwrap();
    driver.step(SCAN).unwrap();

    // Scans 2 and 3 of the first timeline were shelved, latch intact.
    assert_eq!(driver.forks().len(), 1);
    assert_eq!(driver.forks()[0].len(), 2);
    assert_eq!(driver.forks()[0][1].read(l).unwrap(), Value::Bool(true));
    assert_eq!(driver.current().scan_index(), 2);
}

#[test]
fn two_soft_controllers_exchange_over_a_link() {
    // Producer: sends `beat` to the peer's holding:0 every scan.
    let mut b = ProgramBuilder::new(TargetProfile::generic());
    let beat = b.declare("beat", ValueKind::U16).unwrap();
    b.begin_rung(Expr::always()).unwrap();
    b.send(
        beat,
        HwAddress {
            region: Region::Holding,
            index: 0,
        },
    )
    .unwrap();
    b.end_rung().unwrap();
    let producer = b.finish().unwrap();

    // Consumer: lamp on while its mapped register is nonzero.
    let mut b = ProgramBuilder::new(TargetProfile::generic());
    let level = b.declare("level", ValueKind::U16).unwrap();
    let lamp = b.declare("lamp", ValueKind::Bool).unwrap();
    b.begin_rung(Expr::Cmp {
        op: CmpOp::Gt,
        lhs: Operand::Tag(level),
        rhs: Operand::Const(Value::U16(0)),
    })
    .unwrap();
    b.out(lamp).unwrap();
    b.end_rung().unwrap();
    let consumer = b.finish().unwrap();

    let (ep_a, ep_b) = Link::pair();
    let mut a = SoftController::new(producer, RewindPolicy::Truncate, AddressMap::new(), ep_a);
    let mut map = AddressMap::new();
    map.assign(
        level,
        HwAddress {
            region: Region::Holding,
            index: 0,
        },
    );
    let mut c = SoftController::new(consumer, RewindPolicy::Truncate, map, ep_b);

    // The patch lands before Phase 2, so this scan's send already
    // carries 7.
    a.driver_mut().patch(beat, Value::U16(7)).unwrap();
    a.scan(SCAN).unwrap();
    assert!(a.driver().last_report().unwrap().exchange_faults.is_empty());

    c.scan(SCAN).unwrap();
    assert_eq!(c.driver().current().read(level).unwrap(), Value::U16(7));
    // The consumer's condition saw the pre-patch level; one more scan
    // raises the lamp.
    c.scan(SCAN).unwrap();
    assert_eq!(c.driver().current().read(lamp).unwrap(), Value::Bool(true));
}

#[test]
fn validator_flags_a_misdeployed_program() {
    let mut b = ProgramBuilder::new(TargetProfile::generic());
    let sensor = b.declare("sensor", ValueKind::Bool).unwrap();
    let motor = b.declare("motor", ValueKind::Bool).unwrap();
    b.begin_rung(Expr::Tag(sensor)).unwrap();
    b.out(motor).unwrap();
    b.end_rung().unwrap();
    let program = b.finish().unwrap();

    let mut map = AddressMap::new();
    map.assign(
        sensor,
        HwAddress {
            region: Region::Input,
            index: 40,
        },
    );
    map.assign(
        motor,
        HwAddress {
            region: Region::Input,
            index: 1,
        },
    );

    let caps = TargetCaps::relay_io(8, 8, 16);
    let violations = validate(&program, &map, &caps);
    let kinds: Vec<_> = violations.iter().map(|v| v.kind).collect();
    assert!(kinds.contains(&ViolationKind::OutOfRange));
    assert!(kinds.contains(&ViolationKind::RegionReadOnly));

    // Fixing the map clears everything.
    let mut map = AddressMap::new();
    map.assign(
        sensor,
        HwAddress {
            region: Region::Input,
            index: 4,
        },
    );
    map.assign(
        motor,
        HwAddress {
            region: Region::Output,
            index: 1,
        },
    );
    assert!(validate(&program, &map, &caps).is_empty());
}

#[test]
fn generated_c_tracks_the_program_it_came_from() {
    let doc = ProgramDoc::from_json(CONVEYOR).unwrap();
    let program = doc.build().unwrap();

    let mut map = AddressMap::new();
    map.assign(
        program.tags().resolve("start").unwrap(),
        HwAddress {
            region: Region::Input,
            index: 0,
        },
    );
    map.assign(
        program.tags().resolve("motor").unwrap(),
        HwAddress {
            region: Region::Output,
            index: 0,
        },
    );

    let source = CBackend.generate(&program, &map).unwrap();
    assert_eq!(CBackend.file_extension(), "c");
    // Four rungs, four fire locals, and hooks for the two mapped tags.
    for n in 0..4 {
        assert!(source.contains(&format!("bool fire_{n}")));
    }
    assert!(source.contains("relay_read_input_bool(0u)"));
    assert!(source.contains("relay_write_output_bool(0u"));
    // Byte-identical on re-emission.
    assert_eq!(source, CBackend.generate(&program, &map).unwrap());
}

#[test]
fn debug_session_breaks_where_asked() {
    let doc = ProgramDoc::from_json(CONVEYOR).unwrap();
    let program = doc.build().unwrap();
    let start = program.tags().resolve("start").unwrap();
    let motor = program.tags().resolve("motor").unwrap();

    let mut session = DebugSession::new(program, RewindPolicy::Truncate);
    let bp = session
        .add_breakpoint(BreakCondition::TagChanged(motor))
        .unwrap();
    session.force(start, Value::Bool(true)).unwrap();

    let reason = session.resume(Dt::from_millis(10), 100).unwrap();
    assert_eq!(reason, StopReason::Breakpoints(vec![bp]));
    assert_eq!(session.status(), SessionStatus::Paused);
    assert_eq!(session.current().read(motor).unwrap(), Value::Bool(true));
    // Latch at scan 1, warmup done at 6, motor one staleness lag later.
    assert_eq!(session.current().scan_index(), 7);
}

#[test]
fn timer_with_no_elapsed_time_never_completes() {
    let mut h = Harness::from_json(
        r#"{
        "tags": [
            { "name": "run", "kind": "Bool", "init": { "Bool": true } },
            { "name": "done", "kind": "Bool" }
        ],
        "rungs": [
            {
                "when": { "tag": "run" },
                "body": [ { "timer": { "tag": "done", "preset": 1, "kind": "OnDelay" } } ]
            }
        ]
    }"#,
    );
    for _ in 0..5 {
        h.driver_mut().step(Dt(0)).unwrap();
    }
    assert!(!h.bool_tag("done"));
    h.step();
    assert!(h.bool_tag("done"));
}
