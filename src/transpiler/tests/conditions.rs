//! Condition rendering.

use pretty_assertions::assert_eq;

use crate::ast::{Condition, Expr, Value, col};
use crate::query::Select;
use crate::transpiler::conditions::{ConditionToSql, where_clause};
use crate::transpiler::{Dialect, ParamContext};

fn render(cond: &Condition, dialect: Dialect) -> String {
    let generator = dialect.generator();
    let mut ctx = ParamContext::new();
    cond.build_condition(generator.as_ref(), &mut ctx).unwrap()
}

#[test]
fn test_null_comparisons() {
    assert_eq!(render(&Condition::eq("a", Value::Null), Dialect::MySQL), "`a` IS NULL");
    assert_eq!(render(&Condition::ne("a", Value::Null), Dialect::MySQL), "`a` IS NOT NULL");
    assert_eq!(render(&Condition::is_null("a"), Dialect::Postgres), "\"a\" IS NULL");
}

#[test]
fn test_or_and_are_parenthesized() {
    let cond = Condition::eq("a", 1).or(Condition::flag("b"));
    assert_eq!(render(&cond, Dialect::MySQL), "(`a`=? OR `b`)");

    let cond = Condition::eq("a", 1).and(Condition::not_flag("b"));
    assert_eq!(render(&cond, Dialect::Postgres), "(\"a\"=$1 AND NOT \"b\")");
}

#[test]
fn test_where_list_is_joined_without_parens() {
    let generator = Dialect::MySQL.generator();
    let mut ctx = ParamContext::new();
    let clause = where_clause(
        &[Condition::eq("a", 1), Condition::eq("b", 2)],
        generator.as_ref(),
        &mut ctx,
    )
    .unwrap();
    assert_eq!(clause, " WHERE `a`=? AND `b`=?");

    let empty = where_clause(&[], generator.as_ref(), &mut ctx).unwrap();
    assert_eq!(empty, "");
}

#[test]
fn test_in_list_and_subquery() {
    assert_eq!(
        render(&Condition::is_in("id", [1, 2, 3]), Dialect::Postgres),
        "\"id\" IN ($1,$2,$3)"
    );
    let sub = Select::new(["user_id"]).from("NM_Group_User").where_eq("group_id", 4);
    assert_eq!(
        render(&Condition::in_select("id", sub), Dialect::MySQL),
        "`id` IN (SELECT `user_id` FROM `NM_Group_User` WHERE `group_id`=?)"
    );
}

#[test]
fn test_empty_in_list_is_rejected() {
    let generator = Dialect::MySQL.generator();
    let mut ctx = ParamContext::new();
    let cond = Condition::is_in::<i64>("id", []);
    assert!(cond.build_condition(generator.as_ref(), &mut ctx).is_err());
}

#[test]
fn test_keyword_exists_and_regex() {
    assert_eq!(render(&Condition::like("name", "a%"), Dialect::MySQL), "`name` LIKE ?");
    let exists = Condition::exists(Select::new(["id"]).from("Group"));
    assert_eq!(render(&exists, Dialect::MySQL), "EXISTS(SELECT `id` FROM `Group`)");
    assert_eq!(render(&Condition::regex("name", "^a"), Dialect::Postgres), "\"name\" ~ $1");
    assert_eq!(render(&Condition::regex("name", "^a"), Dialect::MySQL), "`name` REGEXP ?");
}

#[test]
fn test_case_when_inlines_literals() {
    let generator = Dialect::Postgres.generator();
    let mut ctx = ParamContext::new();
    let expr = Expr::CaseWhen {
        condition: Box::new(Condition::flag("active")),
        then: Value::from("yes"),
        otherwise: Value::from("it's no"),
    };
    let sql = crate::transpiler::ExprToSql::build_expr(&expr, generator.as_ref(), &mut ctx).unwrap();
    assert_eq!(sql, "CASE WHEN \"active\" THEN 'yes' ELSE 'it''s no' END");
    assert!(ctx.params.is_empty());
}

#[test]
fn test_columns_compared_to_columns() {
    assert_eq!(
        render(&Condition::columns_eq("User.group_id", "t1.id"), Dialect::MySQL),
        "`User`.`group_id`=`t1`.`id`"
    );
    let cond = Condition::eq_expr("a", col("b"));
    assert_eq!(render(&cond, Dialect::Postgres), "\"a\"=\"b\"");
}

#[test]
fn test_inline_context_renders_literals() {
    let generator = Dialect::MySQL.generator();
    let mut ctx = ParamContext::inline();
    let sql = Condition::eq("name", "O'Neil")
        .build_condition(generator.as_ref(), &mut ctx)
        .unwrap();
    assert_eq!(sql, "`name`='O\\'Neil'");
    assert!(ctx.params.is_empty());
}
