//! Typed pipeline stages and expressions produced by the stage parser.

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Source(String),
    Where(Expr),
    Project(Vec<ProjectItem>),
    ProjectAway(Vec<String>),
    Extend(Vec<(String, Expr)>),
    Summarize { aggregates: Vec<Aggregate>, group_by: Vec<ColumnRef> },
    OrderBy(Vec<SortKey>),
    Limit(u64),
    Take(u64),
    Join(JoinStage),
    Top { count: u64, by: SortKey },
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Source(_) => "source",
            Stage::Where(_) => "where",
            Stage::Project(_) => "project",
            Stage::ProjectAway(_) => "project-away",
            Stage::Extend(_) => "extend",
            Stage::Summarize { .. } => "summarize",
            Stage::OrderBy(_) => "order by",
            Stage::Limit(_) => "limit",
            Stage::Take(_) => "take",
            Stage::Join(_) => "join",
            Stage::Top { .. } => "top",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub alias: String,
    pub function: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: ColumnRef,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: ColumnRef::bare(column), direction: SortDirection::Desc }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinStage {
    pub kind: JoinKind,
    pub table: String,
    pub on: JoinCondition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// `on key1, key2`: same-named columns on both sides.
    Keys(Vec<String>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    /// `T` in `T.col`; `$left` / `$right` are kept verbatim and resolved by the plan builder.
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn bare(name: impl Into<String>) -> Self {
        Self { qualifier: None, name: name.into() }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self { qualifier: Some(table.into()), name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Number(String),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Like,
    NotLike,
}

impl CmpOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::NotEq => "<>",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::LtEq => "<=",
            CmpOp::GtEq => ">=",
            CmpOp::Like => "LIKE",
            CmpOp::NotLike => "NOT LIKE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }

    pub(crate) fn binds_tighter(self) -> bool {
        matches!(self, ArithOp::Mul | ArithOp::Div | ArithOp::Mod)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Literal),
    Comparison { op: CmpOp, left: Box<Expr>, right: Box<Expr> },
    Logical { op: LogicalOp, left: Box<Expr>, right: Box<Expr> },
    Arithmetic { op: ArithOp, left: Box<Expr>, right: Box<Expr> },
    FunctionCall { name: String, args: Vec<Expr> },
    /// An earlier `summarize` output used inside a later select list.
    AggregateCall { function: String, args: Vec<Expr> },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::bare(name))
    }

    /// Output column name when the expression is used without an alias.
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Expr::Column(c) => Some(&c.name),
            _ => None,
        }
    }

    /// Rebuilds the tree with every column reference replaced by `f(column)`.
    pub fn map_columns(&self, f: &dyn Fn(&ColumnRef) -> Expr) -> Expr {
        let recurse = |e: &Expr| Box::new(e.map_columns(f));
        match self {
            Expr::Column(c) => f(c),
            Expr::Literal(_) => self.clone(),
            Expr::Comparison { op, left, right } => {
                Expr::Comparison { op: *op, left: recurse(left), right: recurse(right) }
            }
            Expr::Logical { op, left, right } => {
                Expr::Logical { op: *op, left: recurse(left), right: recurse(right) }
            }
            Expr::Arithmetic { op, left, right } => {
                Expr::Arithmetic { op: *op, left: recurse(left), right: recurse(right) }
            }
            Expr::FunctionCall { name, args } => Expr::FunctionCall {
                name: name.clone(),
                args: args.iter().map(|a| a.map_columns(f)).collect(),
            },
            Expr::AggregateCall { function, args } => Expr::AggregateCall {
                function: function.clone(),
                args: args.iter().map(|a| a.map_columns(f)).collect(),
            },
        }
    }

    /// Visits every column reference in the tree.
    pub fn walk_columns<'a>(&'a self, f: &mut dyn FnMut(&'a ColumnRef)) {
        match self {
            Expr::Column(c) => f(c),
            Expr::Literal(_) => {}
            Expr::Comparison { left, right, .. }
            | Expr::Logical { left, right, .. }
            | Expr::Arithmetic { left, right, .. } => {
                left.walk_columns(f);
                right.walk_columns(f);
            }
            Expr::FunctionCall { args, .. } | Expr::AggregateCall { args, .. } => {
                args.iter().for_each(|a| a.walk_columns(f))
            }
        }
    }
}
