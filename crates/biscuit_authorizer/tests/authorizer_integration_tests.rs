//! Integration tests for the Biscuit authorizer
//!
//! Builds tokens block by block and checks decisions, trust boundaries
//! between blocks, resource limits and world dumps.

use biscuit_authorizer::builder::{
    self, allow_if, check_all, check_if, constrained_query, deny_if, fact, int, pred, reject_if,
    rule, string, var, Binary, Check, Expression, Op, Scope,
};
use biscuit_authorizer::{
    Authorizer, BlockBuilder, Error, FailedCheck, Logic, MatchedPolicy, PublicKey, RunLimit,
    RunLimits, Token,
};
use biscuit_datalog::CheckKind;
use pretty_assertions::assert_eq;
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn limits() -> RunLimits {
    RunLimits::default().with_max_time(Duration::from_secs(1))
}

fn authority_token() -> Token {
    let mut authority = BlockBuilder::new();
    authority
        .add_fact(fact("right", &[string("file1"), string("read")]))
        .unwrap();
    authority
        .add_fact(fact("right", &[string("file2"), string("read")]))
        .unwrap();
    authority
        .add_fact(fact("right", &[string("file1"), string("write")]))
        .unwrap();
    Token::new(authority.build().unwrap())
}

fn request(authorizer: &mut Authorizer, resource: &str, operation: &str) {
    authorizer
        .add_fact(fact("resource", &[string(resource)]))
        .unwrap();
    authorizer
        .add_fact(fact("operation", &[string(operation)]))
        .unwrap();
}

fn rights_policy() -> builder::Policy {
    allow_if(&[
        pred("resource", &[var("r")]),
        pred("operation", &[var("op")]),
        pred("right", &[var("r"), var("op")]),
    ])
}

// ============================================================================
// End-to-End Decisions
// ============================================================================

#[test]
fn test_read_file1_is_allowed() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_token(&authority_token()).unwrap();
    request(&mut authorizer, "file1", "read");
    authorizer.add_policy(rights_policy()).unwrap();

    assert_eq!(authorizer.authorize(), Ok(0));
}

#[test]
fn test_missing_right_falls_through_to_deny() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_token(&authority_token()).unwrap();
    request(&mut authorizer, "file2", "write");
    authorizer.add_policy(rights_policy()).unwrap();
    authorizer.deny();

    assert_eq!(
        authorizer.authorize(),
        Err(Error::FailedLogic(Logic::Unauthorized {
            policy: MatchedPolicy::Deny(1),
            checks: vec![],
        }))
    );
}

#[test]
fn test_attenuation_check_restricts_token() {
    init_logging();
    let mut attenuation = BlockBuilder::new();
    attenuation
        .add_check(check_if(&[pred("operation", &[string("read")])]))
        .unwrap();
    let token = authority_token().append(attenuation.build().unwrap());

    let mut allowed = Authorizer::with_limits(limits());
    allowed.add_token(&token).unwrap();
    request(&mut allowed, "file1", "read");
    allowed.add_policy(rights_policy()).unwrap();
    assert_eq!(allowed.authorize(), Ok(0));

    let mut denied = Authorizer::with_limits(limits());
    denied.add_token(&token).unwrap();
    request(&mut denied, "file1", "write");
    denied.add_policy(rights_policy()).unwrap();
    assert_eq!(
        denied.authorize(),
        Err(Error::FailedLogic(Logic::Unauthorized {
            policy: MatchedPolicy::Allow(0),
            checks: vec![FailedCheck::Block {
                block_id: 1,
                check_id: 0,
                rule: "check if operation(\"read\")".to_string(),
            }],
        }))
    );
}

#[test]
fn test_every_failed_check_is_reported_in_order() {
    init_logging();
    let mut authority = BlockBuilder::new();
    authority
        .add_check(check_if(&[pred("resource", &[string("file9")])]))
        .unwrap();
    let mut attenuation = BlockBuilder::new();
    attenuation
        .add_check(reject_if(&[pred("operation", &[string("write")])]))
        .unwrap();
    let token = Token::new(authority.build().unwrap()).append(attenuation.build().unwrap());

    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_token(&token).unwrap();
    request(&mut authorizer, "file1", "write");
    authorizer
        .add_check(check_all(&[pred("resource", &[string("file2")])]))
        .unwrap();

    match authorizer.authorize() {
        Err(Error::FailedLogic(Logic::NoMatchingPolicy { checks })) => {
            assert_eq!(
                checks,
                vec![
                    FailedCheck::Block {
                        block_id: 0,
                        check_id: 0,
                        rule: "check if resource(\"file9\")".to_string(),
                    },
                    FailedCheck::Block {
                        block_id: 1,
                        check_id: 0,
                        rule: "reject if operation(\"write\")".to_string(),
                    },
                    FailedCheck::Authorizer {
                        check_id: 0,
                        rule: "check all resource(\"file2\")".to_string(),
                    },
                ]
            );
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn test_policies_are_tried_in_order() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_token(&authority_token()).unwrap();
    request(&mut authorizer, "file1", "read");
    authorizer
        .add_policy(deny_if(&[pred("operation", &[string("read")])]))
        .unwrap();
    authorizer.add_policy(rights_policy()).unwrap();

    assert!(matches!(
        authorizer.authorize(),
        Err(Error::FailedLogic(Logic::Unauthorized {
            policy: MatchedPolicy::Deny(0),
            ..
        }))
    ));
}

#[test]
fn test_policy_with_alternative_queries() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    request(&mut authorizer, "file1", "read");
    authorizer
        .add_policy(builder::Policy {
            queries: vec![
                builder::query(&[pred("operation", &[string("write")])]),
                builder::query(&[pred("resource", &[string("file1")])]),
            ],
            kind: builder::PolicyKind::Allow,
        })
        .unwrap();
    assert_eq!(authorizer.authorize(), Ok(0));
}

#[test]
fn test_expression_constrained_policy() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_fact(fact("quota", &[int(12)])).unwrap();
    authorizer
        .add_policy(builder::Policy {
            queries: vec![constrained_query(
                &[pred("quota", &[var("q")])],
                &[Expression::new(vec![
                    Op::Value(var("q")),
                    Op::Value(int(10)),
                    Op::Binary(Binary::LessThan),
                ])],
            )],
            kind: builder::PolicyKind::Allow,
        })
        .unwrap();
    authorizer.deny();

    assert!(matches!(
        authorizer.authorize(),
        Err(Error::FailedLogic(Logic::Unauthorized {
            policy: MatchedPolicy::Deny(1),
            ..
        }))
    ));
}

fn file1_token(rights: &[&str]) -> Token {
    let mut authority = BlockBuilder::new();
    for op in rights {
        authority
            .add_fact(fact("right", &[string("file1"), string(op)]))
            .unwrap();
    }
    Token::new(authority.build().unwrap())
}

fn read_right_check() -> Check {
    check_if(&[
        pred("resource", &[var("r")]),
        pred("operation", &[string("read")]),
        pred("right", &[var("r"), string("read")]),
    ])
}

#[test]
fn test_read_right_check_with_allow_all() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_token(&file1_token(&["read", "write"])).unwrap();
    request(&mut authorizer, "file1", "read");
    authorizer.add_check(read_right_check()).unwrap();
    authorizer.allow();

    assert_eq!(authorizer.authorize(), Ok(0));
}

#[test]
fn test_read_right_check_fails_without_read_right() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_token(&file1_token(&["write"])).unwrap();
    request(&mut authorizer, "file1", "read");
    authorizer.add_check(read_right_check()).unwrap();
    authorizer.allow();

    assert_eq!(
        authorizer.authorize(),
        Err(Error::FailedLogic(Logic::Unauthorized {
            policy: MatchedPolicy::Allow(0),
            checks: vec![FailedCheck::Authorizer {
                check_id: 0,
                rule: "check if resource($r), operation(\"read\"), right($r, \"read\")"
                    .to_string(),
            }],
        }))
    );
}

// ============================================================================
// Check Kinds
// ============================================================================

#[test]
fn test_empty_query_lists() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    for kind in [CheckKind::One, CheckKind::All, CheckKind::Reject] {
        authorizer
            .add_check(Check {
                queries: vec![],
                kind,
            })
            .unwrap();
    }
    authorizer.allow();

    match authorizer.authorize() {
        Err(Error::FailedLogic(Logic::Unauthorized { checks, .. })) => {
            assert_eq!(checks.len(), 1);
            assert!(matches!(checks[0], FailedCheck::Authorizer { check_id: 0, .. }));
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn test_check_all_requires_every_query() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    request(&mut authorizer, "file1", "read");
    authorizer
        .add_check(Check {
            queries: vec![
                builder::query(&[pred("resource", &[string("file1")])]),
                builder::query(&[pred("operation", &[string("write")])]),
            ],
            kind: CheckKind::All,
        })
        .unwrap();
    authorizer.allow();

    assert!(matches!(
        authorizer.authorize(),
        Err(Error::FailedLogic(Logic::Unauthorized { .. }))
    ));
}

// ============================================================================
// Trust Boundaries
// ============================================================================

#[test]
fn test_attenuation_block_cannot_add_rights() {
    init_logging();
    let mut attenuation = BlockBuilder::new();
    attenuation
        .add_fact(fact("right", &[string("file3"), string("read")]))
        .unwrap();
    attenuation
        .add_rule(rule(
            "right",
            &[var("f"), string("write")],
            &[pred("right", &[var("f"), string("read")])],
        ))
        .unwrap();
    let token = authority_token().append(attenuation.build().unwrap());

    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_token(&token).unwrap();
    request(&mut authorizer, "file3", "read");
    authorizer.add_policy(rights_policy()).unwrap();
    assert!(matches!(
        authorizer.authorize(),
        Err(Error::FailedLogic(Logic::NoMatchingPolicy { .. }))
    ));

    // the block 1 rule did derive facts, but only under an origin containing block 1
    let rights = authorizer
        .query(rule(
            "r",
            &[var("f")],
            &[pred("right", &[var("f"), string("write")])],
        ))
        .unwrap();
    assert_eq!(rights, vec![fact("r", &[string("file1")])]);
}

#[test]
fn test_previous_scope_reads_earlier_blocks() {
    init_logging();
    let mut first = BlockBuilder::new();
    first.add_fact(fact("tag", &[string("beta")])).unwrap();

    let mut second = BlockBuilder::new();
    second
        .add_check(Check {
            queries: vec![builder::query(&[pred("tag", &[string("beta")])]).trusting(&[Scope::Previous])],
            kind: CheckKind::One,
        })
        .unwrap();

    let mut third = BlockBuilder::new();
    third
        .add_check(check_if(&[pred("tag", &[string("beta")])]))
        .unwrap();

    let token = authority_token()
        .append(first.build().unwrap())
        .append(second.build().unwrap())
        .append(third.build().unwrap());

    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_token(&token).unwrap();
    authorizer.allow();

    // block 2 trusts block 1 explicitly; block 3 only sees authority and itself
    assert_eq!(
        authorizer.authorize(),
        Err(Error::FailedLogic(Logic::Unauthorized {
            policy: MatchedPolicy::Allow(0),
            checks: vec![FailedCheck::Block {
                block_id: 3,
                check_id: 0,
                rule: "check if tag(\"beta\")".to_string(),
            }],
        }))
    );
}

#[test]
fn test_third_party_block_trusted_by_key() {
    init_logging();
    let issuer = PublicKey::ed25519(vec![0x42; 32]);

    let mut third_party = BlockBuilder::new();
    third_party
        .add_fact(fact("group", &[string("admin")]))
        .unwrap();
    let token = authority_token().append(third_party.build_third_party(issuer.clone()).unwrap());

    let trusted_policy = builder::Policy {
        queries: vec![builder::query(&[pred("group", &[string("admin")])])
            .trusting(&[Scope::PublicKey(issuer.clone())])],
        kind: builder::PolicyKind::Allow,
    };

    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_token(&token).unwrap();
    authorizer.add_policy(trusted_policy).unwrap();
    assert_eq!(authorizer.authorize(), Ok(0));

    let mut untrusting = Authorizer::with_limits(limits());
    untrusting.add_token(&token).unwrap();
    untrusting
        .add_policy(allow_if(&[pred("group", &[string("admin")])]))
        .unwrap();
    assert!(untrusting.authorize().is_err());

    let mut by_scope = Authorizer::with_limits(limits());
    by_scope.add_token(&token).unwrap();
    by_scope.add_scope(Scope::PublicKey(issuer));
    by_scope
        .add_policy(allow_if(&[pred("group", &[string("admin")])]))
        .unwrap();
    assert_eq!(by_scope.authorize(), Ok(0));
}

// ============================================================================
// Resource Limits
// ============================================================================

#[test]
fn test_fact_explosion_is_bounded() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    for i in 0..40 {
        authorizer.add_fact(fact("n", &[int(i)])).unwrap();
    }
    authorizer
        .add_rule(rule(
            "pair",
            &[var("x"), var("y")],
            &[pred("n", &[var("x")]), pred("n", &[var("y")])],
        ))
        .unwrap();
    authorizer.allow();

    assert_eq!(
        authorizer.authorize(),
        Err(Error::RunLimit(RunLimit::TooManyFacts))
    );
}

#[test]
fn test_long_chain_is_bounded_by_iterations() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits().with_max_iterations(10));
    authorizer.add_fact(fact("reach", &[int(0)])).unwrap();
    for i in 0..30 {
        authorizer.add_fact(fact("next", &[int(i), int(i + 1)])).unwrap();
    }
    authorizer
        .add_rule(rule(
            "reach",
            &[var("y")],
            &[pred("reach", &[var("x")]), pred("next", &[var("x"), var("y")])],
        ))
        .unwrap();
    authorizer.allow();

    assert_eq!(
        authorizer.authorize(),
        Err(Error::RunLimit(RunLimit::TooManyIterations))
    );
}

#[test]
fn test_zero_time_budget() {
    init_logging();
    let mut authorizer = Authorizer::new();
    authorizer.add_token(&authority_token()).unwrap();
    authorizer.allow();

    let result = authorizer.authorize_with_limits(RunLimits::default().with_max_time(Duration::ZERO));
    assert_eq!(result, Err(Error::RunLimit(RunLimit::Timeout)));
}

#[test]
fn test_unbounded_time_budget() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(RunLimits::default().with_max_time(Duration::MAX));
    authorizer.add_token(&file1_token(&["read", "write"])).unwrap();
    request(&mut authorizer, "file1", "read");
    authorizer.add_check(read_right_check()).unwrap();
    authorizer.allow();
    assert_eq!(authorizer.authorize(), Ok(0));

    let files = authorizer
        .query(rule(
            "writable",
            &[var("f")],
            &[pred("right", &[var("f"), string("write")])],
        ))
        .unwrap();
    assert_eq!(files, vec![fact("writable", &[string("file1")])]);
}

// ============================================================================
// Queries & Dumps
// ============================================================================

#[test]
fn test_query_returns_distinct_facts() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_token(&authority_token()).unwrap();
    // same right asserted by the authorizer too: two origins, one result
    authorizer
        .add_fact(fact("right", &[string("file1"), string("read")]))
        .unwrap();

    let mut files = authorizer
        .query(rule(
            "readable",
            &[var("f")],
            &[pred("right", &[var("f"), string("read")])],
        ))
        .unwrap();
    files.sort_by_key(|f| f.to_string());
    assert_eq!(
        files,
        vec![
            fact("readable", &[string("file1")]),
            fact("readable", &[string("file2")]),
        ]
    );
}

#[test]
fn test_query_rejects_unbound_head() {
    let mut authorizer = Authorizer::new();
    let err = authorizer
        .query(rule("bad", &[var("x")], &[pred("right", &[var("y")])]))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRule { .. }));
}

#[test]
fn test_print_world_and_dump() {
    init_logging();
    let mut authorizer = Authorizer::with_limits(limits());
    authorizer.add_token(&authority_token()).unwrap();
    request(&mut authorizer, "file1", "read");
    authorizer
        .add_check(check_if(&[pred("operation", &[string("read")])]))
        .unwrap();
    authorizer.add_policy(rights_policy()).unwrap();
    authorizer.authorize().unwrap();

    let world = authorizer.print_world();
    assert!(world.contains("right(\"file1\", \"read\");"));
    assert!(world.contains("// origin: authorizer"));
    assert!(world.contains("check if operation(\"read\");"));
    assert!(world.contains("allow if resource($r), operation($op), right($r, $op);"));

    let dump = authorizer.dump();
    assert_eq!(dump.facts.len(), 2);
    assert_eq!(dump.facts[0].origin, "0");
    assert_eq!(dump.facts[0].facts.len(), 3);
    assert_eq!(dump.iterations, 1);

    let json = dump.to_json().unwrap();
    assert_eq!(biscuit_authorizer::AuthorizerDump::from_json(&json).unwrap(), dump);
}

#[test]
fn test_limits_from_environment_defaults() {
    let authorizer = Authorizer::with_limits(RunLimits::from_env());
    assert!(authorizer.limits().max_facts > 0);
}
