//! Declarative dynamic model: parameters, variables, intermediates,
//! differential equations and least-squares objective terms.

use std::collections::HashSet;

use crate::common::{CraneError, CraneResult, TimeGrid};
use crate::model::expr::{Bindings, Expr, Symbol, SymbolKind};

/// Name reserved for the time column of every solution
const RESERVED_NAMES: [&str; 1] = ["time"];

/// Semantic role of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableRole {
    /// Integrated through a differential equation
    State,
    /// Chosen by the optimizer (MV)
    Control,
}

/// Fixed scalar or time-indexed parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(f64),
    Series(Vec<f64>),
}

impl ParamValue {
    /// Value at time sample `k`
    pub fn at(&self, k: usize) -> f64 {
        match self {
            ParamValue::Scalar(v) => *v,
            ParamValue::Series(values) => values.get(k).copied().unwrap_or(f64::NAN),
        }
    }

    /// Value used when the model is written out as text
    pub fn nominal(&self) -> f64 {
        self.at(0)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Scalar(value)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(values: Vec<f64>) -> Self {
        ParamValue::Series(values)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub role: VariableRole,
    pub initial: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intermediate {
    pub name: String,
    pub expr: Expr,
    pub note: String,
}

/// `d(variables[state])/dt = rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEquation {
    pub state: usize,
    pub rhs: Expr,
    pub note: String,
}

/// Contributes `weight * residual^2` at every time sample
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveTerm {
    pub weight: Expr,
    pub residual: Expr,
}

/// Initial value, bounds and note for a variable declaration
#[derive(Debug, Clone, PartialEq)]
pub struct VarSpec {
    initial: f64,
    lower: Option<f64>,
    upper: Option<f64>,
    note: String,
}

impl VarSpec {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            lower: None,
            upper: None,
            note: String::new(),
        }
    }

    pub fn bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = Some(lower);
        self.upper = Some(upper);
        self
    }

    pub fn note(mut self, note: &str) -> Self {
        self.note = note.to_string();
        self
    }
}

/// Handle to a declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRef {
    index: usize,
    name: String,
}

/// Handle to a declared variable, carrying its role
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    index: usize,
    name: String,
    role: VariableRole,
}

/// Handle to a declared intermediate
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateRef {
    index: usize,
    name: String,
}

macro_rules! impl_handle {
    ($handle:ident, $kind:expr) => {
        impl $handle {
            pub fn name(&self) -> &str {
                &self.name
            }

            pub fn index(&self) -> usize {
                self.index
            }

            pub fn expr(&self) -> Expr {
                Expr::Symbol(Symbol {
                    kind: $kind,
                    index: self.index,
                    name: self.name.clone(),
                })
            }
        }

        impl From<&$handle> for Expr {
            fn from(handle: &$handle) -> Expr {
                handle.expr()
            }
        }
    };
}

impl_handle!(ParamRef, SymbolKind::Parameter);
impl_handle!(VarRef, SymbolKind::Variable);
impl_handle!(IntermediateRef, SymbolKind::Intermediate);

impl VarRef {
    pub fn role(&self) -> VariableRole {
        self.role
    }
}

/// Collects declarations; `build` validates them into a `Model`
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    name: String,
    comments: Vec<String>,
    time: Option<TimeGrid>,
    parameters: Vec<Parameter>,
    variables: Vec<Variable>,
    intermediates: Vec<Intermediate>,
    equations: Vec<DiffEquation>,
    objectives: Vec<ObjectiveTerm>,
}

impl ModelBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            comments: Vec::new(),
            time: None,
            parameters: Vec::new(),
            variables: Vec::new(),
            intermediates: Vec::new(),
            equations: Vec::new(),
            objectives: Vec::new(),
        }
    }

    /// Header comment written at the top of the model document
    pub fn comment(&mut self, text: &str) -> &mut Self {
        self.comments.push(text.to_string());
        self
    }

    pub fn time(&mut self, grid: TimeGrid) -> &mut Self {
        self.time = Some(grid);
        self
    }

    pub fn param(&mut self, name: &str, value: impl Into<ParamValue>, note: &str) -> ParamRef {
        self.parameters.push(Parameter {
            name: name.to_string(),
            value: value.into(),
            note: note.to_string(),
        });
        ParamRef {
            index: self.parameters.len() - 1,
            name: name.to_string(),
        }
    }

    pub fn state(&mut self, name: &str, spec: VarSpec) -> VarRef {
        self.variable(name, VariableRole::State, spec)
    }

    pub fn control(&mut self, name: &str, spec: VarSpec) -> VarRef {
        self.variable(name, VariableRole::Control, spec)
    }

    fn variable(&mut self, name: &str, role: VariableRole, spec: VarSpec) -> VarRef {
        self.variables.push(Variable {
            name: name.to_string(),
            role,
            initial: spec.initial,
            lower: spec.lower,
            upper: spec.upper,
            note: spec.note,
        });
        VarRef {
            index: self.variables.len() - 1,
            name: name.to_string(),
            role,
        }
    }

    pub fn intermediate(&mut self, name: &str, expr: Expr, note: &str) -> IntermediateRef {
        self.intermediates.push(Intermediate {
            name: name.to_string(),
            expr,
            note: note.to_string(),
        });
        IntermediateRef {
            index: self.intermediates.len() - 1,
            name: name.to_string(),
        }
    }

    /// Declare `d(state)/dt = rhs`
    pub fn equation(&mut self, state: &VarRef, rhs: Expr, note: &str) -> &mut Self {
        self.equations.push(DiffEquation {
            state: state.index,
            rhs,
            note: note.to_string(),
        });
        self
    }

    /// Minimize `weight * residual^2` summed over the time grid
    pub fn minimize(&mut self, weight: impl Into<Expr>, residual: Expr) -> &mut Self {
        self.objectives.push(ObjectiveTerm {
            weight: weight.into(),
            residual,
        });
        self
    }

    pub fn build(self) -> CraneResult<Model> {
        self.check_names()?;
        self.check_variables()?;
        self.check_parameters()?;

        for (i, intermediate) in self.intermediates.iter().enumerate() {
            self.check_references(&intermediate.expr, Some(i), &intermediate.name)?;
        }

        let mut equation_of = vec![None; self.variables.len()];
        for (i, equation) in self.equations.iter().enumerate() {
            let variable = self.variables.get(equation.state).ok_or_else(|| {
                CraneError::ModelError(format!("equation {} targets an unknown variable", i + 1))
            })?;
            if variable.role != VariableRole::State {
                return Err(CraneError::ModelError(format!(
                    "control '{}' cannot have a differential equation",
                    variable.name
                )));
            }
            if equation_of[equation.state].is_some() {
                return Err(CraneError::ModelError(format!(
                    "state '{}' has more than one differential equation",
                    variable.name
                )));
            }
            equation_of[equation.state] = Some(i);
            self.check_references(&equation.rhs, None, &format!("${}", variable.name))?;
        }
        if let Some(missing) = self
            .variables
            .iter()
            .zip(equation_of.iter())
            .find(|(v, eq)| v.role == VariableRole::State && eq.is_none())
        {
            return Err(CraneError::ModelError(format!(
                "state '{}' has no differential equation",
                missing.0.name
            )));
        }

        for term in &self.objectives {
            self.check_references(&term.weight, None, "objective weight")?;
            self.check_references(&term.residual, None, "objective residual")?;
            if let Some(w) = term.weight.as_constant() {
                if !(w >= 0.0) {
                    return Err(CraneError::ModelError(format!(
                        "objective weight {} must be non-negative",
                        w
                    )));
                }
            }
        }

        Ok(Model {
            name: self.name,
            comments: self.comments,
            time: self.time,
            parameters: self.parameters,
            variables: self.variables,
            intermediates: self.intermediates,
            equations: self.equations,
            objectives: self.objectives,
        })
    }

    fn check_names(&self) -> CraneResult<()> {
        let names = self
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.variables.iter().map(|v| v.name.as_str()))
            .chain(self.intermediates.iter().map(|i| i.name.as_str()));

        let mut seen = HashSet::new();
        for name in names {
            if !is_identifier(name) {
                return Err(CraneError::ModelError(format!("'{}' is not a valid name", name)));
            }
            let key = name.to_lowercase();
            if RESERVED_NAMES.contains(&key.as_str()) {
                return Err(CraneError::ModelError(format!("'{}' is a reserved name", name)));
            }
            // APM names are case-insensitive
            if !seen.insert(key) {
                return Err(CraneError::ModelError(format!("'{}' is declared twice", name)));
            }
        }
        Ok(())
    }

    fn check_variables(&self) -> CraneResult<()> {
        for v in &self.variables {
            if !v.initial.is_finite() {
                return Err(CraneError::ModelError(format!(
                    "variable '{}' has a non-finite initial value",
                    v.name
                )));
            }
            if let (Some(lo), Some(hi)) = (v.lower, v.upper) {
                if lo > hi {
                    return Err(CraneError::ModelError(format!(
                        "variable '{}' has lower bound {} above upper bound {}",
                        v.name, lo, hi
                    )));
                }
            }
            let below = v.lower.map_or(false, |lo| v.initial < lo);
            let above = v.upper.map_or(false, |hi| v.initial > hi);
            if below || above {
                return Err(CraneError::ModelError(format!(
                    "initial value of '{}' lies outside its bounds",
                    v.name
                )));
            }
        }
        Ok(())
    }

    fn check_parameters(&self) -> CraneResult<()> {
        for p in &self.parameters {
            match &p.value {
                ParamValue::Scalar(v) if !v.is_finite() => {
                    return Err(CraneError::ModelError(format!(
                        "parameter '{}' is not finite",
                        p.name
                    )));
                }
                ParamValue::Series(values) => {
                    let grid = self.time.as_ref().ok_or_else(|| {
                        CraneError::ModelError(format!(
                            "time-varying parameter '{}' requires a time grid",
                            p.name
                        ))
                    })?;
                    if values.len() != grid.len() {
                        return Err(CraneError::ModelError(format!(
                            "parameter '{}' has {} values for {} time points",
                            p.name,
                            values.len(),
                            grid.len()
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Every symbol must name a declaration of this builder. Intermediate
    /// `owner` may only see intermediates declared before it.
    fn check_references(&self, expr: &Expr, owner: Option<usize>, context: &str) -> CraneResult<()> {
        for symbol in expr.symbols() {
            let declared = match symbol.kind {
                SymbolKind::Parameter => self.parameters.get(symbol.index).map(|p| &p.name),
                SymbolKind::Variable => self.variables.get(symbol.index).map(|v| &v.name),
                SymbolKind::Intermediate => {
                    if owner.map_or(false, |i| symbol.index >= i) {
                        return Err(CraneError::ModelError(format!(
                            "intermediate '{}' uses '{}' before it is defined",
                            context, symbol.name
                        )));
                    }
                    self.intermediates.get(symbol.index).map(|i| &i.name)
                }
            };
            if declared != Some(&symbol.name) {
                return Err(CraneError::ModelError(format!(
                    "{} refers to undeclared '{}'",
                    context, symbol.name
                )));
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validated, immutable model
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    name: String,
    comments: Vec<String>,
    time: Option<TimeGrid>,
    parameters: Vec<Parameter>,
    variables: Vec<Variable>,
    intermediates: Vec<Intermediate>,
    equations: Vec<DiffEquation>,
    objectives: Vec<ObjectiveTerm>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn time(&self) -> Option<&TimeGrid> {
        self.time.as_ref()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn intermediates(&self) -> &[Intermediate] {
        &self.intermediates
    }

    pub fn equations(&self) -> &[DiffEquation] {
        &self.equations
    }

    pub fn objectives(&self) -> &[ObjectiveTerm] {
        &self.objectives
    }

    /// Typed handle for a variable name, case-insensitive
    pub fn variable(&self, name: &str) -> Option<VarRef> {
        self.variables
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(name))
            .map(|index| self.var_ref(index))
    }

    pub fn controls(&self) -> Vec<VarRef> {
        self.refs_with_role(VariableRole::Control)
    }

    pub fn states(&self) -> Vec<VarRef> {
        self.refs_with_role(VariableRole::State)
    }

    fn refs_with_role(&self, role: VariableRole) -> Vec<VarRef> {
        (0..self.variables.len())
            .filter(|&i| self.variables[i].role == role)
            .map(|i| self.var_ref(i))
            .collect()
    }

    fn var_ref(&self, index: usize) -> VarRef {
        let v = &self.variables[index];
        VarRef {
            index,
            name: v.name.clone(),
            role: v.role,
        }
    }

    pub fn initial_values(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.initial).collect()
    }

    /// Parameter values at time sample `k`
    pub fn parameter_values(&self, k: usize) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value.at(k)).collect()
    }

    /// Intermediates in declaration order
    pub fn evaluate_intermediates(&self, parameters: &[f64], variables: &[f64]) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.intermediates.len());
        for intermediate in &self.intermediates {
            let value = intermediate.expr.eval(&Bindings {
                parameters,
                variables,
                intermediates: &values,
            });
            values.push(value);
        }
        values
    }

    /// Time derivative of every variable; zero for controls
    pub fn derivatives(&self, parameters: &[f64], variables: &[f64]) -> Vec<f64> {
        let intermediates = self.evaluate_intermediates(parameters, variables);
        let bindings = Bindings {
            parameters,
            variables,
            intermediates: &intermediates,
        };
        let mut rates = vec![0.0; self.variables.len()];
        for equation in &self.equations {
            rates[equation.state] = equation.rhs.eval(&bindings);
        }
        rates
    }

    /// Append `sqrt(weight) * residual` for each objective term
    pub fn weighted_residuals(
        &self,
        parameters: &[f64],
        variables: &[f64],
        out: &mut Vec<f64>,
    ) -> CraneResult<()> {
        let intermediates = self.evaluate_intermediates(parameters, variables);
        let bindings = Bindings {
            parameters,
            variables,
            intermediates: &intermediates,
        };
        for term in &self.objectives {
            let weight = term.weight.eval(&bindings);
            if !(weight >= 0.0) {
                return Err(CraneError::NumericalError(format!(
                    "objective weight {} evaluated to {}",
                    term.weight, weight
                )));
            }
            out.push(weight.sqrt() * term.residual.eval(&bindings));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oscillator() -> ModelBuilder {
        let mut b = ModelBuilder::new("oscillator");
        let k = b.param("k", 4.0, "stiffness");
        let f = b.control("f", VarSpec::new(0.0).bounds(-1.0, 1.0));
        let x = b.state("x", VarSpec::new(1.0));
        let v = b.state("v", VarSpec::new(0.0));
        let accel = b.intermediate("accel", f.expr() - k.expr() * x.expr(), "");
        b.equation(&x, v.expr(), "").equation(&v, accel.expr(), "");
        b.minimize(1.0, x.expr());
        b
    }

    #[test]
    fn test_build_and_evaluate() {
        let model = oscillator().build().unwrap();
        let params = model.parameter_values(0);
        // f, x, v
        let rates = model.derivatives(&params, &[0.5, 1.0, 2.0]);
        assert_eq!(rates, vec![0.0, 2.0, 0.5 - 4.0]);

        let mut residuals = Vec::new();
        model.weighted_residuals(&params, &[0.5, 1.0, 2.0], &mut residuals).unwrap();
        assert_eq!(residuals, vec![1.0]);
    }

    #[test]
    fn test_typed_lookup() {
        let model = oscillator().build().unwrap();
        let f = model.variable("F").unwrap();
        assert_eq!(f.role(), VariableRole::Control);
        assert_eq!(f.name(), "f");
        assert!(model.variable("missing").is_none());
        assert_eq!(model.controls().len(), 1);
        assert_eq!(model.states().len(), 2);
    }

    #[test]
    fn test_duplicate_equation_rejected() {
        let mut b = oscillator();
        let x = VarRef { index: 1, name: "x".to_string(), role: VariableRole::State };
        b.equation(&x, Expr::constant(0.0), "");
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn test_missing_equation_rejected() {
        let mut b = ModelBuilder::new("m");
        b.state("x", VarSpec::new(0.0));
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("no differential equation"));
    }

    #[test]
    fn test_control_equation_rejected() {
        let mut b = ModelBuilder::new("m");
        let u = b.control("u", VarSpec::new(0.0));
        b.equation(&u, Expr::constant(1.0), "");
        assert!(b.build().is_err());
    }

    #[test]
    fn test_names_validated() {
        let mut b = ModelBuilder::new("m");
        b.param("M1", 1.0, "");
        b.param("m1", 2.0, "");
        assert!(b.build().is_err());

        let mut b = ModelBuilder::new("m");
        b.param("time", 1.0, "");
        assert!(b.build().is_err());

        let mut b = ModelBuilder::new("m");
        b.param("2x", 1.0, "");
        assert!(b.build().is_err());
    }

    #[test]
    fn test_bounds_validated() {
        let mut b = ModelBuilder::new("m");
        b.control("u", VarSpec::new(20.0).bounds(-10.0, 10.0));
        assert!(b.build().is_err());

        let mut b = ModelBuilder::new("m");
        b.control("u", VarSpec::new(0.0).bounds(1.0, -1.0));
        assert!(b.build().is_err());
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut other = ModelBuilder::new("other");
        other.param("a", 1.0, "");
        let foreign = other.param("b", 1.0, "");

        let mut b = ModelBuilder::new("m");
        let x = b.state("x", VarSpec::new(0.0));
        b.equation(&x, foreign.expr(), "");
        let err = b.build().unwrap_err();
        assert!(err.to_string().contains("undeclared 'b'"));
    }

    #[test]
    fn test_intermediate_order_enforced() {
        let mut b = ModelBuilder::new("m");
        let later = IntermediateRef { index: 1, name: "b".to_string() };
        b.intermediate("a", later.expr(), "");
        b.intermediate("b", Expr::constant(1.0), "");
        assert!(b.build().is_err());
    }

    #[test]
    fn test_series_parameter_needs_matching_grid() {
        let mut b = ModelBuilder::new("m");
        b.param("w", vec![0.0, 1.0], "");
        assert!(b.clone().build().is_err());

        b.time(TimeGrid::linspace(0.0, 1.0, 3).unwrap());
        assert!(b.clone().build().is_err());

        let mut b = ModelBuilder::new("m");
        b.time(TimeGrid::linspace(0.0, 1.0, 2).unwrap());
        let w = b.param("w", vec![0.0, 1.0], "");
        let model = b.build().unwrap();
        assert_eq!(model.parameter_values(1), vec![1.0]);
        assert_eq!(w.index(), 0);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut b = ModelBuilder::new("m");
        let u = b.control("u", VarSpec::new(0.0));
        b.minimize(-1.0, u.expr());
        assert!(b.build().is_err());
    }
}
