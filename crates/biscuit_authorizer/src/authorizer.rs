//! The authorizer: loads a token, runs the world, decides.
//!
//! An [`Authorizer`] gathers three kinds of content:
//! - the blocks of one [`Token`], each tagged with its position,
//! - facts, rules, checks and policies of its own, tagged as authorizer content,
//! - resource limits for the evaluation.
//!
//! [`Authorizer::authorize`] saturates the world, evaluates every block check
//! in block order, then the authorizer checks, then the policies in
//! declaration order. The first policy with a matching query decides.

use biscuit_datalog::rule::translate_scope;
use biscuit_datalog::{
    self as datalog, Origin, RunLimits, SymbolTable, Term, TrustedOrigins, World, WorldState,
    AUTHORIZER_BLOCK,
};
use chrono::Utc;
use log::{debug, trace};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::block::{Token, MAX_SCHEMA_VERSION, MIN_SCHEMA_VERSION};
use crate::builder::{self, PolicyKind};
use crate::dump::{AuthorizerDump, BlockChecks, OriginFacts, OriginRules};
use crate::error::{Error, FailedCheck, Logic, MatchedPolicy, Result};

/// Checks carried by one token block, with the block's default trust.
#[derive(Debug, Clone)]
struct LoadedBlock {
    trusted: TrustedOrigins,
    checks: Vec<datalog::Check>,
}

/// Evaluates a token against local facts, checks and policies.
///
/// An authorizer accepts at most one token. It is not meant to be shared:
/// create one per request.
#[derive(Debug, Clone)]
pub struct Authorizer {
    world: World,
    symbols: SymbolTable,
    blocks: Option<Vec<LoadedBlock>>,
    public_key_to_block_id: HashMap<usize, Vec<usize>>,
    scopes: Vec<builder::Scope>,
    pending_rules: Vec<builder::Rule>,
    rules: Vec<builder::Rule>,
    checks: Vec<builder::Check>,
    policies: Vec<builder::Policy>,
    limits: RunLimits,
}

impl Default for Authorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Authorizer {
    /// Creates an empty authorizer with the default [`RunLimits`].
    pub fn new() -> Self {
        Self::with_limits(RunLimits::default())
    }

    /// Creates an empty authorizer evaluating under `limits`.
    pub fn with_limits(limits: RunLimits) -> Self {
        Self {
            world: World::new(),
            symbols: SymbolTable::new(),
            blocks: None,
            public_key_to_block_id: HashMap::new(),
            scopes: Vec::new(),
            pending_rules: Vec::new(),
            rules: Vec::new(),
            checks: Vec::new(),
            policies: Vec::new(),
            limits,
        }
    }

    pub fn set_limits(&mut self, limits: RunLimits) {
        self.limits = limits;
    }

    pub fn limits(&self) -> &RunLimits {
        &self.limits
    }

    /// Loads the blocks of `token`.
    ///
    /// Block content is translated into the authorizer's symbol table, facts
    /// and rules are tagged with their block index, and every block's trusted
    /// origins are derived from its scopes. Nothing is loaded if any block
    /// fails to translate.
    ///
    /// # Errors
    ///
    /// * [`Error::AuthorizerNotEmpty`] if a token was already loaded.
    /// * [`Error::Format`] on an unsupported block version or a dangling
    ///   symbol or public key id.
    /// * [`Logic::InvalidBlockRule`] if a block rule or check query has
    ///   unbound variables.
    pub fn add_token(&mut self, token: &Token) -> Result<()> {
        if self.blocks.is_some() {
            return Err(Error::AuthorizerNotEmpty);
        }

        for (block_id, block) in token.blocks().iter().enumerate() {
            if !(MIN_SCHEMA_VERSION..=MAX_SCHEMA_VERSION).contains(&block.version) {
                return Err(Error::Format(format!(
                    "block {} has unsupported version {}",
                    block_id, block.version
                )));
            }
        }

        // translated into a copy, committed once every block loaded
        let mut symbols = self.symbols.clone();
        let mut public_key_to_block_id: HashMap<usize, Vec<usize>> = HashMap::new();
        for (block_id, block) in token.blocks().iter().enumerate() {
            if let Some(key) = &block.external_key {
                let key_id = symbols.public_keys_mut().insert(key) as usize;
                public_key_to_block_id.entry(key_id).or_default().push(block_id);
            }
        }

        let mut facts = Vec::new();
        let mut rules = Vec::new();
        let mut loaded = Vec::with_capacity(token.block_count());

        for (block_id, block) in token.blocks().iter().enumerate() {
            let scopes = block
                .scopes
                .iter()
                .map(|s| translate_scope(s, &block.symbols, &mut symbols))
                .collect::<datalog::Result<Vec<_>>>()?;
            let block_trusted = TrustedOrigins::from_scopes(
                &scopes,
                &TrustedOrigins::default(),
                block_id,
                &public_key_to_block_id,
            );

            for fact in &block.facts {
                facts.push((block_id, fact.translate(&block.symbols, &mut symbols)?));
            }

            for rule in &block.rules {
                let rule = rule.translate(&block.symbols, &mut symbols)?;
                if !rule.is_well_formed() {
                    return Err(Logic::InvalidBlockRule {
                        block_id,
                        rule: symbols.print_rule(&rule),
                    }
                    .into());
                }
                let trusted = TrustedOrigins::from_scopes(
                    &rule.scopes,
                    &block_trusted,
                    block_id,
                    &public_key_to_block_id,
                );
                rules.push((block_id, trusted, rule));
            }

            let checks = block
                .checks
                .iter()
                .map(|c| c.translate(&block.symbols, &mut symbols))
                .collect::<datalog::Result<Vec<_>>>()?;
            if let Some(query) = checks
                .iter()
                .flat_map(|c| c.queries.iter())
                .find(|q| !q.is_well_formed())
            {
                return Err(Logic::InvalidBlockRule {
                    block_id,
                    rule: symbols.print_rule(query),
                }
                .into());
            }
            loaded.push(LoadedBlock {
                trusted: block_trusted,
                checks,
            });
        }

        for (block_id, fact) in facts {
            self.world.add_fact(&Origin::block(block_id), fact);
        }
        for (block_id, trusted, rule) in rules {
            self.world.add_rule(block_id, trusted, rule);
        }
        debug!(
            "loaded token with {} blocks, {} facts in world",
            loaded.len(),
            self.world.facts().len()
        );
        self.symbols = symbols;
        self.blocks = Some(loaded);
        self.public_key_to_block_id = public_key_to_block_id;
        Ok(())
    }

    /// Adds an authorizer fact.
    pub fn add_fact(&mut self, fact: builder::Fact) -> Result<()> {
        let fact = fact.convert(&mut self.symbols)?;
        self.world.add_fact(&Origin::authorizer(), fact);
        Ok(())
    }

    /// Adds an authorizer rule. Its trust is resolved at every evaluation,
    /// from the token and authorizer scopes known at that point.
    pub fn add_rule(&mut self, rule: builder::Rule) -> Result<()> {
        rule.validate()?;
        self.pending_rules.push(rule);
        Ok(())
    }

    pub fn add_check(&mut self, check: builder::Check) -> Result<()> {
        check.validate()?;
        self.checks.push(check);
        Ok(())
    }

    /// Adds a policy. Policies are tried in the order they were added.
    pub fn add_policy(&mut self, policy: builder::Policy) -> Result<()> {
        policy.validate()?;
        self.policies.push(policy);
        Ok(())
    }

    /// Sets a default trust scope for authorizer rules, checks and policies.
    pub fn add_scope(&mut self, scope: builder::Scope) {
        self.scopes.push(scope);
    }

    /// Adds an unconditional `allow if true` policy.
    pub fn allow(&mut self) {
        self.policies.push(builder::Policy {
            queries: vec![builder::query(&[])],
            kind: PolicyKind::Allow,
        });
    }

    /// Adds an unconditional `deny if true` policy.
    pub fn deny(&mut self) {
        self.policies.push(builder::Policy {
            queries: vec![builder::query(&[])],
            kind: PolicyKind::Deny,
        });
    }

    /// Asserts `time(<now>)` as an authorizer fact.
    pub fn set_time(&mut self) {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        let time = self.symbols.insert("time");
        self.world.add_fact(
            &Origin::authorizer(),
            datalog::Fact::new(time, vec![Term::Date(now)]),
        );
    }

    /// Runs the authorization with the configured limits.
    ///
    /// Returns the index of the matching allow policy.
    pub fn authorize(&mut self) -> Result<usize> {
        self.authorize_with_limits(self.limits)
    }

    /// Runs the authorization.
    ///
    /// # Arguments
    ///
    /// * `limits` - Bounds for the fixpoint and every check or policy query.
    ///   The time budget covers the whole call.
    ///
    /// # Returns
    ///
    /// `Ok(index)` of the first matching allow policy when no check failed.
    /// `Err(Error::FailedLogic(..))` carries every failed check and the
    /// policy that matched, if any.
    pub fn authorize_with_limits(&mut self, limits: RunLimits) -> Result<usize> {
        let deadline = limits.deadline_from(Instant::now());
        self.saturate(&limits, deadline)?;

        let authorizer_trusted = self.authorizer_trusted();
        let checks: Vec<datalog::Check> = self
            .checks
            .iter()
            .map(|c| c.convert(&mut self.symbols))
            .collect();
        let policies: Vec<(PolicyKind, Vec<datalog::Rule>)> = self
            .policies
            .iter()
            .map(|p| {
                let queries = p.queries.iter().map(|q| q.convert(&mut self.symbols)).collect();
                (p.kind, queries)
            })
            .collect();

        let mut failed = Vec::new();

        for (block_id, block) in self.blocks.iter().flatten().enumerate() {
            for (check_id, check) in block.checks.iter().enumerate() {
                let passed = check.evaluate(&self.world, &self.symbols, deadline, |query| {
                    TrustedOrigins::from_scopes(
                        &query.scopes,
                        &block.trusted,
                        block_id,
                        &self.public_key_to_block_id,
                    )
                })?;
                if !passed {
                    let rule = self.symbols.print_check(check);
                    trace!("block {} check {} failed: {}", block_id, check_id, rule);
                    failed.push(FailedCheck::Block {
                        block_id,
                        check_id,
                        rule,
                    });
                }
            }
        }

        for (check_id, check) in checks.iter().enumerate() {
            let passed = check.evaluate(&self.world, &self.symbols, deadline, |query| {
                self.trusted_for(query, &authorizer_trusted)
            })?;
            if !passed {
                let rule = self.symbols.print_check(check);
                trace!("authorizer check {} failed: {}", check_id, rule);
                failed.push(FailedCheck::Authorizer { check_id, rule });
            }
        }

        let mut matched = None;
        'policies: for (policy_id, (kind, queries)) in policies.iter().enumerate() {
            for query in queries {
                let trusted = self.trusted_for(query, &authorizer_trusted);
                if self
                    .world
                    .query_match(query, &trusted, &self.symbols, deadline)?
                {
                    matched = Some(match kind {
                        PolicyKind::Allow => MatchedPolicy::Allow(policy_id),
                        PolicyKind::Deny => MatchedPolicy::Deny(policy_id),
                    });
                    break 'policies;
                }
            }
        }

        debug!(
            "authorization decided: policy {:?}, {} failed checks",
            matched,
            failed.len()
        );
        match matched {
            Some(MatchedPolicy::Allow(policy_id)) if failed.is_empty() => Ok(policy_id),
            Some(policy) => Err(Logic::Unauthorized {
                policy,
                checks: failed,
            }
            .into()),
            None => Err(Logic::NoMatchingPolicy { checks: failed }.into()),
        }
    }

    /// Runs `rule` against the saturated world with the configured limits.
    pub fn query(&mut self, rule: builder::Rule) -> Result<Vec<builder::Fact>> {
        self.query_with_limits(rule, self.limits)
    }

    /// Runs `rule` against the saturated world and returns the distinct head
    /// facts it produces. The query is evaluated with the authorizer's trust.
    pub fn query_with_limits(
        &mut self,
        rule: builder::Rule,
        limits: RunLimits,
    ) -> Result<Vec<builder::Fact>> {
        rule.validate()?;
        let deadline = limits.deadline_from(Instant::now());
        self.saturate(&limits, deadline)?;

        let rule = rule.convert(&mut self.symbols);
        let authorizer_trusted = self.authorizer_trusted();
        let trusted = self.trusted_for(&rule, &authorizer_trusted);
        let results = self.world.query_rule(
            &rule,
            AUTHORIZER_BLOCK,
            &trusted,
            &self.symbols,
            deadline,
        )?;

        let mut seen = HashSet::new();
        results
            .iter()
            .filter(|(_, fact)| seen.insert(*fact))
            .map(|(_, fact)| builder::Fact::convert_from(fact, &self.symbols))
            .collect()
    }

    /// Structured snapshot of the world and the pending decision inputs.
    pub fn dump(&self) -> AuthorizerDump {
        let mut symbols = self.symbols.clone();

        let facts = self
            .world
            .facts()
            .iter_by_origin()
            .map(|(origin, facts)| OriginFacts {
                origin: origin.to_string(),
                facts: facts.iter().map(|f| symbols.print_fact(f)).collect(),
            })
            .collect();

        let mut rules_by_origin: Vec<OriginRules> = Vec::new();
        let world_rules = self
            .world
            .rules()
            .iter()
            .map(|entry| (entry.origin, symbols.print_rule(&entry.rule)));
        let pending = self
            .pending_rules
            .iter()
            .map(|r| (AUTHORIZER_BLOCK, r.to_string()))
            .collect::<Vec<_>>();
        for (origin, rule) in world_rules.chain(pending) {
            let label = Origin::block(origin).to_string();
            match rules_by_origin.iter_mut().find(|r| r.origin == label) {
                Some(group) => group.rules.push(rule),
                None => rules_by_origin.push(OriginRules {
                    origin: label,
                    rules: vec![rule],
                }),
            }
        }

        let mut checks: Vec<BlockChecks> = self
            .blocks
            .iter()
            .flatten()
            .enumerate()
            .map(|(block_id, block)| BlockChecks {
                origin: Origin::block(block_id).to_string(),
                checks: block.checks.iter().map(|c| symbols.print_check(c)).collect(),
            })
            .collect();
        checks.push(BlockChecks {
            origin: Origin::authorizer().to_string(),
            checks: self
                .checks
                .iter()
                .map(|c| {
                    let check = c.convert(&mut symbols);
                    symbols.print_check(&check)
                })
                .collect(),
        });

        AuthorizerDump {
            facts,
            rules: rules_by_origin,
            checks,
            policies: self.policies.iter().map(|p| p.to_string()).collect(),
            iterations: self.world.iterations(),
        }
    }

    /// Human-readable rendering of [`Authorizer::dump`].
    pub fn print_world(&self) -> String {
        self.dump().to_string()
    }

    /// Number of passes the last fixpoint run performed.
    pub fn iterations(&self) -> u64 {
        self.world.iterations()
    }

    /// Loads pending authorizer rules, refreshes the trust of every
    /// authorizer rule and runs the world unless it already converged.
    fn saturate(&mut self, limits: &RunLimits, deadline: Option<Instant>) -> Result<()> {
        let authorizer_trusted = self.authorizer_trusted();
        for rule in std::mem::take(&mut self.pending_rules) {
            let converted = rule.convert(&mut self.symbols);
            let trusted = self.trusted_for(&converted, &authorizer_trusted);
            self.world.add_rule(AUTHORIZER_BLOCK, trusted, converted);
            self.rules.push(rule);
        }

        let public_key_to_block_id = &self.public_key_to_block_id;
        self.world.update_trust(AUTHORIZER_BLOCK, |rule| {
            TrustedOrigins::from_scopes(
                &rule.scopes,
                &authorizer_trusted,
                AUTHORIZER_BLOCK,
                public_key_to_block_id,
            )
        });

        if self.world.state() != WorldState::Converged {
            self.world.run_until(&self.symbols, limits, deadline)?;
        }
        Ok(())
    }

    /// Default trust of authorizer content, from the authorizer scopes.
    fn authorizer_trusted(&mut self) -> TrustedOrigins {
        let scopes = self
            .scopes
            .iter()
            .map(|s| s.convert(&mut self.symbols))
            .collect::<Vec<_>>();
        TrustedOrigins::from_scopes(
            &scopes,
            &TrustedOrigins::default(),
            AUTHORIZER_BLOCK,
            &self.public_key_to_block_id,
        )
    }

    fn trusted_for(&self, rule: &datalog::Rule, default: &TrustedOrigins) -> TrustedOrigins {
        TrustedOrigins::from_scopes(
            &rule.scopes,
            default,
            AUTHORIZER_BLOCK,
            &self.public_key_to_block_id,
        )
    }
}
