//! Static analysis over the expression AST.

use std::collections::BTreeSet;

use super::ast::Expr;

/// Identifiers referenced by `expr` that no enclosing `fn` parameter or `let`
/// binds, in order of first appearance.
pub fn free_variables(expr: &Expr) -> Vec<String> {
    let mut collector = FreeVariables::default();
    collector.visit(expr);
    collector.found
}

/// Packages named through `pkg::name` references, sorted
pub fn package_references(expr: &Expr) -> BTreeSet<String> {
    let mut packages = BTreeSet::new();
    walk(expr, &mut |e| {
        if let Expr::Qualified { package, .. } = e {
            packages.insert(package.clone());
        }
    });
    packages
}

#[derive(Default)]
struct FreeVariables {
    bound: Vec<String>,
    found: Vec<String>,
    seen: BTreeSet<String>,
}

impl FreeVariables {
    fn visit(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) | Expr::Qualified { .. } => {}
            Expr::Ident(name) => {
                if !self.bound.iter().any(|b| b == name) && self.seen.insert(name.clone()) {
                    self.found.push(name.clone());
                }
            }
            Expr::List(items) => items.iter().for_each(|e| self.visit(e)),
            Expr::Unary { operand, .. } => self.visit(operand),
            Expr::Binary { left, right, .. } => {
                self.visit(left);
                self.visit(right);
            }
            Expr::Call { callee, args } => {
                self.visit(callee);
                args.iter().for_each(|e| self.visit(e));
            }
            Expr::Index { target, index } => {
                self.visit(target);
                self.visit(index);
            }
            Expr::Lambda(lambda) => {
                let mark = self.bound.len();
                self.bound.extend(lambda.params.iter().cloned());
                self.visit(&lambda.body);
                self.bound.truncate(mark);
            }
            Expr::Let { name, value, body } => {
                self.bound.push(name.clone());
                self.visit(value);
                self.visit(body);
                self.bound.pop();
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.visit(condition);
                self.visit(then_branch);
                if let Some(e) = else_branch {
                    self.visit(e);
                }
            }
        }
    }
}

fn walk(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    f(expr);
    match expr {
        Expr::Literal(_) | Expr::Ident(_) | Expr::Qualified { .. } => {}
        Expr::List(items) => items.iter().for_each(|e| walk(e, f)),
        Expr::Unary { operand, .. } => walk(operand, f),
        Expr::Binary { left, right, .. } => {
            walk(left, f);
            walk(right, f);
        }
        Expr::Call { callee, args } => {
            walk(callee, f);
            args.iter().for_each(|e| walk(e, f));
        }
        Expr::Index { target, index } => {
            walk(target, f);
            walk(index, f);
        }
        Expr::Lambda(lambda) => walk(&lambda.body, f),
        Expr::Let { value, body, .. } => {
            walk(value, f);
            walk(body, f);
        }
        Expr::If {
            condition,
            then_branch,
            else_branch,
        } => {
            walk(condition, f);
            walk(then_branch, f);
            if let Some(e) = else_branch {
                walk(e, f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;

    fn free(source: &str) -> Vec<String> {
        free_variables(&parse_expression(source).unwrap())
    }

    #[test]
    fn test_free_variables_in_order() {
        assert_eq!(free("f(x) + y * x"), vec!["f", "x", "y"]);
    }

    #[test]
    fn test_params_are_bound() {
        assert_eq!(free("fn(a) { a + b }"), vec!["b"]);
        assert!(free("fn(a, b) { a * b }").is_empty());
    }

    #[test]
    fn test_let_binding_scopes_over_value_and_body() {
        assert_eq!(
            free("let fact = fn(n) { if n <= 1 { 1 } else { n * fact(n - 1) } }; fact(k)"),
            vec!["k"]
        );
    }

    #[test]
    fn test_binding_does_not_leak_outside_lambda() {
        assert_eq!(free("[fn(x) { x }, x]"), vec!["x"]);
    }

    #[test]
    fn test_qualified_names_are_not_free() {
        let expr = parse_expression("math::sqrt(x) + text::upper(s)").unwrap();
        assert_eq!(free_variables(&expr), vec!["x", "s"]);
        let packages: Vec<_> = package_references(&expr).into_iter().collect();
        assert_eq!(packages, vec!["math", "text"]);
    }
}
