//! Syntax tree produced by the parser and consumed by the printer.
//!
//! Word text is kept exactly as written (quotes included) except for command
//! substitutions, which hold a parsed program so they can be reprinted.

/// A sequence of statements: a whole program or the body of a compound
/// command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct List {
    pub stmts: Vec<Stmt>,
    /// A newline appeared somewhere inside the list in the source.
    pub multiline: bool,
}

/// One entry of a list. A statement with no command is a comment line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stmt {
    pub and_or: Option<AndOr>,
    pub background: bool,
    pub comment: Option<String>,
    pub newline_before: bool,
    pub blank_before: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndOrOp {
    And,
    Or,
}

impl AndOrOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AndOrOp::And => "&&",
            AndOrOp::Or => "||",
        }
    }
}

/// How the source broke the line around a binary operator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Break {
    #[default]
    None,
    /// `\` newline on either side of the operator.
    Continuation,
    /// Newline after the operator, with the comments on the skipped lines.
    Newline(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AndOr {
    pub first: Pipeline,
    pub rest: Vec<(AndOrOp, Break, Pipeline)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub bang: bool,
    pub first: Command,
    /// `(stderr_too, break, command)` for each `|` or `|&`.
    pub rest: Vec<(bool, Break, Command)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    /// Redirections trailing a compound command.
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Simple(Vec<SimpleItem>),
    Brace(List),
    Subshell(List),
    If {
        branches: Vec<(List, List)>,
        otherwise: Option<List>,
    },
    Loop {
        until: bool,
        cond: List,
        body: List,
    },
    For {
        var: String,
        words: Option<Vec<Word>>,
        body: List,
        multiline: bool,
    },
    Case {
        word: Word,
        arms: Vec<CaseArm>,
        /// Comment lines between the last arm and `esac`.
        trailing: Vec<String>,
        multiline: bool,
    },
    Function {
        name: String,
        keyword: bool,
        parens: bool,
        body: Box<Command>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    /// Comment lines above the patterns.
    pub comments: Vec<String>,
    pub patterns: Vec<Word>,
    pub body: List,
}

/// Arguments and redirections of a simple command, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleItem {
    pub kind: SimpleItemKind,
    /// Preceded by a `\` newline in the source.
    pub continued: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimpleItemKind {
    Word(Word),
    Redirect(Redirect),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirOp {
    In,
    Out,
    Append,
    HereDoc,
    HereDocStrip,
    HereString,
    DupIn,
    DupOut,
    ReadWrite,
    Clobber,
    AllOut,
    AllAppend,
}

impl RedirOp {
    pub fn as_str(self) -> &'static str {
        match self {
            RedirOp::In => "<",
            RedirOp::Out => ">",
            RedirOp::Append => ">>",
            RedirOp::HereDoc => "<<",
            RedirOp::HereDocStrip => "<<-",
            RedirOp::HereString => "<<<",
            RedirOp::DupIn => "<&",
            RedirOp::DupOut => ">&",
            RedirOp::ReadWrite => "<>",
            RedirOp::Clobber => ">|",
            RedirOp::AllOut => "&>",
            RedirOp::AllAppend => "&>>",
        }
    }

    pub fn is_heredoc(self) -> bool {
        matches!(self, RedirOp::HereDoc | RedirOp::HereDocStrip)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub fd: Option<String>,
    pub op: RedirOp,
    pub target: Word,
    /// Body lines (each ending in a newline) and the closing delimiter line,
    /// for here-documents.
    pub heredoc: Option<HereDoc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HereDoc {
    pub body: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Word {
    pub parts: Vec<WordPart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    /// Source text reproduced as is: plain characters, escapes, single
    /// quotes, parameter and arithmetic expansions, backquotes.
    Lit(String),
    /// A double-quoted section.
    Quoted(Vec<WordPart>),
    /// `$( ... )`
    CmdSubst(List),
}

impl Word {
    /// The word's text when it is a single unquoted literal, as reserved
    /// words and names must be.
    pub fn as_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [WordPart::Lit(text)] => Some(text),
            _ => None,
        }
    }
}

impl List {
    /// Visit every here-document redirection in source order, without
    /// descending into command substitutions (those own their bodies).
    pub(crate) fn for_each_heredoc(&mut self, f: &mut dyn FnMut(&mut Redirect)) {
        for stmt in &mut self.stmts {
            if let Some(and_or) = &mut stmt.and_or {
                and_or.first.for_each_heredoc(f);
                for (_, _, pipeline) in &mut and_or.rest {
                    pipeline.for_each_heredoc(f);
                }
            }
        }
    }
}

impl Pipeline {
    fn for_each_heredoc(&mut self, f: &mut dyn FnMut(&mut Redirect)) {
        self.first.for_each_heredoc(f);
        for (_, _, command) in &mut self.rest {
            command.for_each_heredoc(f);
        }
    }
}

impl Command {
    fn for_each_heredoc(&mut self, f: &mut dyn FnMut(&mut Redirect)) {
        match &mut self.kind {
            CommandKind::Simple(items) => {
                for item in items {
                    if let SimpleItemKind::Redirect(redirect) = &mut item.kind {
                        if redirect.op.is_heredoc() {
                            f(redirect);
                        }
                    }
                }
            }
            CommandKind::Brace(list) | CommandKind::Subshell(list) => list.for_each_heredoc(f),
            CommandKind::If { branches, otherwise } => {
                for (cond, body) in branches {
                    cond.for_each_heredoc(f);
                    body.for_each_heredoc(f);
                }
                if let Some(list) = otherwise {
                    list.for_each_heredoc(f);
                }
            }
            CommandKind::Loop { cond, body, .. } => {
                cond.for_each_heredoc(f);
                body.for_each_heredoc(f);
            }
            CommandKind::For { body, .. } => body.for_each_heredoc(f),
            CommandKind::Case { arms, .. } => {
                for arm in arms {
                    arm.body.for_each_heredoc(f);
                }
            }
            CommandKind::Function { body, .. } => body.for_each_heredoc(f),
        }
        for redirect in &mut self.redirects {
            if redirect.op.is_heredoc() {
                f(redirect);
            }
        }
    }
}
