//! Verified token content.
//!
//! Signature verification and decoding are done by the token layer before a
//! [`Token`] reaches this crate. A [`Block`] is what that layer hands over:
//! Datalog content expressed against the block's own [`SymbolTable`].

use biscuit_datalog::{
    Binary, Check, CheckKind, Expression, Fact, Op, PublicKey, Rule, Scope, SymbolTable,
};
use serde::{Deserialize, Serialize};

use crate::builder;
use crate::error::Result;

/// Oldest block format the authorizer evaluates.
pub const MIN_SCHEMA_VERSION: u32 = 3;
/// Newest block format the authorizer evaluates.
pub const MAX_SCHEMA_VERSION: u32 = 5;

/// One signed block of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Strings and public keys referenced by this block's content.
    pub symbols: SymbolTable,
    pub facts: Vec<Fact>,
    pub rules: Vec<Rule>,
    pub checks: Vec<Check>,
    /// Default trust scopes for the block's rules and checks.
    pub scopes: Vec<Scope>,
    /// Free-form annotation, not used in evaluation.
    pub context: Option<String>,
    /// Signer of a third-party block.
    pub external_key: Option<PublicKey>,
    pub version: u32,
}

impl Block {
    /// Renders the block content, one statement per line.
    pub fn print_source(&self) -> String {
        let facts = self.facts.iter().map(|f| format!("{};", self.symbols.print_fact(f)));
        let rules = self.rules.iter().map(|r| format!("{};", self.symbols.print_rule(r)));
        let checks = self.checks.iter().map(|c| format!("{};", self.symbols.print_check(c)));
        facts.chain(rules).chain(checks).collect::<Vec<_>>().join("\n")
    }
}

/// Assembles a [`Block`] from builder content.
#[derive(Debug, Clone, Default)]
pub struct BlockBuilder {
    facts: Vec<builder::Fact>,
    rules: Vec<builder::Rule>,
    checks: Vec<builder::Check>,
    scopes: Vec<builder::Scope>,
    context: Option<String>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fact(&mut self, fact: builder::Fact) -> Result<()> {
        fact.validate()?;
        self.facts.push(fact);
        Ok(())
    }

    pub fn add_rule(&mut self, rule: builder::Rule) -> Result<()> {
        rule.validate()?;
        self.rules.push(rule);
        Ok(())
    }

    pub fn add_check(&mut self, check: builder::Check) -> Result<()> {
        check.validate()?;
        self.checks.push(check);
        Ok(())
    }

    pub fn add_scope(&mut self, scope: builder::Scope) {
        self.scopes.push(scope);
    }

    pub fn set_context(&mut self, context: impl Into<String>) {
        self.context = Some(context.into());
    }

    /// Builds a first-party block.
    pub fn build(self) -> Result<Block> {
        self.build_with_key(None)
    }

    /// Builds a block signed by the third party holding `key`.
    pub fn build_third_party(self, key: PublicKey) -> Result<Block> {
        self.build_with_key(Some(key))
    }

    fn build_with_key(self, external_key: Option<PublicKey>) -> Result<Block> {
        let mut symbols = SymbolTable::new();
        let facts = self
            .facts
            .iter()
            .map(|f| f.convert(&mut symbols))
            .collect::<Result<Vec<_>>>()?;
        let rules = self.rules.iter().map(|r| r.convert(&mut symbols)).collect();
        let checks = self.checks.iter().map(|c| c.convert(&mut symbols)).collect();
        let scopes = self.scopes.iter().map(|s| s.convert(&mut symbols)).collect();

        let mut block = Block {
            symbols,
            facts,
            rules,
            checks,
            scopes,
            context: self.context,
            external_key,
            version: MIN_SCHEMA_VERSION,
        };
        block.version = required_version(&block);
        Ok(block)
    }
}

/// The oldest format able to carry the block's content.
fn required_version(block: &Block) -> u32 {
    let uses_reject = block.checks.iter().any(|c| c.kind == CheckKind::Reject);
    if uses_reject {
        return 5;
    }

    let all_rules = || block.rules.iter().chain(block.checks.iter().flat_map(|c| &c.queries));
    let uses_scopes = !block.scopes.is_empty() || all_rules().any(|r| !r.scopes.is_empty());
    let uses_check_all = block.checks.iter().any(|c| c.kind == CheckKind::All);
    let uses_bitwise = all_rules()
        .flat_map(|r| r.expressions.iter())
        .any(uses_bitwise_op);

    if uses_scopes || uses_check_all || uses_bitwise || block.external_key.is_some() {
        4
    } else {
        MIN_SCHEMA_VERSION
    }
}

fn uses_bitwise_op(expression: &Expression) -> bool {
    expression.ops.iter().any(|op| {
        matches!(
            op,
            Op::Binary(Binary::BitwiseAnd | Binary::BitwiseOr | Binary::BitwiseXor)
        )
    })
}

/// An ordered chain of verified blocks; block 0 is the authority block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    blocks: Vec<Block>,
}

impl Token {
    pub fn new(authority: Block) -> Self {
        Self {
            blocks: vec![authority],
        }
    }

    /// Appends an attenuation block.
    pub fn append(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{check_all, check_if, fact, pred, reject_if, string, var};
    use crate::error::Error;

    #[test]
    fn test_build_block() {
        let mut builder = BlockBuilder::new();
        builder.add_fact(fact("right", &[string("file1"), string("read")])).unwrap();
        builder
            .add_check(check_if(&[pred("operation", &[string("read")])]))
            .unwrap();
        builder.set_context("first");

        let block = builder.build().unwrap();
        assert_eq!(block.version, 3);
        assert_eq!(block.context.as_deref(), Some("first"));
        assert_eq!(
            block.print_source(),
            "right(\"file1\", \"read\");\ncheck if operation(\"read\");"
        );
    }

    #[test]
    fn test_builder_rejects_invalid_content() {
        let mut builder = BlockBuilder::new();
        assert!(matches!(
            builder.add_fact(fact("right", &[var("x")])),
            Err(Error::InvalidFact(_))
        ));
        assert!(matches!(
            builder.add_rule(crate::builder::rule("a", &[var("x")], &[])),
            Err(Error::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_version_follows_features() {
        let mut builder = BlockBuilder::new();
        builder.add_check(check_all(&[pred("a", &[])])).unwrap();
        assert_eq!(builder.build().unwrap().version, 4);

        let mut builder = BlockBuilder::new();
        builder.add_check(reject_if(&[pred("a", &[])])).unwrap();
        assert_eq!(builder.build().unwrap().version, 5);

        let key = PublicKey::ed25519(vec![1; 32]);
        let block = BlockBuilder::new().build_third_party(key.clone()).unwrap();
        assert_eq!(block.version, 4);
        assert_eq!(block.external_key, Some(key));
    }

    #[test]
    fn test_token_blocks() {
        let authority = BlockBuilder::new().build().unwrap();
        let token = Token::new(authority.clone()).append(BlockBuilder::new().build().unwrap());
        assert_eq!(token.block_count(), 2);
        assert_eq!(token.blocks()[0], authority);
    }
}
