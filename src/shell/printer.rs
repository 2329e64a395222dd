use super::ast::{
    AndOr, Break, CaseArm, Command, CommandKind, HereDoc, List, Pipeline, Redirect, SimpleItem,
    SimpleItemKind, Stmt, Word, WordPart,
};

/// Print a parsed program in canonical form. Non-empty output ends with a
/// newline.
pub fn print(list: &List) -> String {
    let mut printer = Printer::default();
    printer.stmts(list, false);
    if printer.out.is_empty() && printer.pending.is_empty() {
        return String::new();
    }
    printer.line_break();
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
    level: usize,
    /// Here-documents whose bodies go after the current line.
    pending: Vec<HereDoc>,
}

impl Printer {
    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn line_break(&mut self) {
        self.out.push('\n');
        for heredoc in std::mem::take(&mut self.pending) {
            self.out.push_str(&heredoc.body);
            self.out.push_str(&heredoc.end);
            self.out.push('\n');
        }
    }

    fn newline_at(&mut self, level: usize) {
        self.line_break();
        for _ in 0..level {
            self.out.push('\t');
        }
    }

    fn newline(&mut self) {
        self.newline_at(self.level);
    }

    /// Break inside a statement; continuation lines sit one level deeper.
    fn indented_newline(&mut self) {
        self.newline_at(self.level + 1);
    }

    /// Statements one per source line. With `leading` every statement,
    /// including the first, starts on a fresh line.
    fn stmts(&mut self, list: &List, leading: bool) {
        let mut prev: Option<&Stmt> = None;
        for stmt in &list.stmts {
            match prev {
                None if leading => self.newline(),
                None => {}
                Some(p) if stmt.newline_before || p.comment.is_some() => {
                    if stmt.blank_before {
                        self.line_break();
                    }
                    self.newline();
                }
                Some(p) => self.separator(p),
            }
            self.stmt(stmt);
            prev = Some(stmt);
        }
    }

    fn separator(&mut self, prev: &Stmt) {
        self.push(if prev.background { " " } else { "; " });
    }

    /// Indented body followed by a line break back at the current level.
    fn block(&mut self, list: &List) {
        self.level += 1;
        self.stmts(list, true);
        self.level -= 1;
        self.newline();
    }

    fn inline_stmts(&mut self, list: &List) {
        for (i, stmt) in list.stmts.iter().enumerate() {
            if i > 0 {
                self.separator(&list.stmts[i - 1]);
            }
            self.stmt(stmt);
        }
    }

    /// Statements on one line, each terminated, ready for a closing keyword.
    fn inline_list(&mut self, list: &List) {
        self.inline_stmts(list);
        if let Some(last) = list.stmts.last() {
            self.separator(last);
        }
    }

    /// Condition lists and similar headers stay on the keyword's line when
    /// nothing in them forces a line break.
    fn header(&mut self, list: &List) {
        if fits_inline(list) {
            self.push(" ");
            self.inline_list(list);
        } else {
            self.block(list);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match (&stmt.and_or, &stmt.comment) {
            (Some(and_or), comment) => {
                self.and_or(and_or);
                if stmt.background {
                    self.push(" &");
                }
                if let Some(comment) = comment {
                    self.push(" ");
                    self.push(comment);
                }
            }
            (None, Some(comment)) => self.push(comment),
            (None, None) => {}
        }
    }

    fn operator(&mut self, op: &str, brk: &Break) {
        self.push(" ");
        self.push(op);
        match brk {
            Break::None => self.push(" "),
            Break::Continuation => self.indented_newline(),
            Break::Newline(comments) => {
                for comment in comments {
                    self.indented_newline();
                    self.push(comment);
                }
                self.indented_newline();
            }
        }
    }

    fn and_or(&mut self, and_or: &AndOr) {
        self.pipeline(&and_or.first);
        for (op, brk, pipeline) in &and_or.rest {
            self.operator(op.as_str(), brk);
            self.pipeline(pipeline);
        }
    }

    fn pipeline(&mut self, pipeline: &Pipeline) {
        if pipeline.bang {
            self.push("! ");
        }
        self.command(&pipeline.first);
        for (stderr_too, brk, command) in &pipeline.rest {
            self.operator(if *stderr_too { "|&" } else { "|" }, brk);
            self.command(command);
        }
    }

    fn command(&mut self, command: &Command) {
        match &command.kind {
            CommandKind::Simple(items) => self.simple(items),
            CommandKind::Brace(body) => {
                if inline(&[body]) {
                    self.push("{ ");
                    self.inline_list(body);
                    self.push("}");
                } else {
                    self.push("{");
                    self.block(body);
                    self.push("}");
                }
            }
            CommandKind::Subshell(body) => {
                self.push("(");
                if inline(&[body]) {
                    self.space_before_subshell(body);
                    self.inline_stmts(body);
                } else {
                    self.block(body);
                }
                self.push(")");
            }
            CommandKind::If {
                branches,
                otherwise,
            } => self.if_clause(branches, otherwise.as_ref()),
            CommandKind::Loop { until, cond, body } => {
                self.push(if *until { "until" } else { "while" });
                self.header(cond);
                self.push("do");
                self.body(body, "done");
            }
            CommandKind::For {
                var,
                words,
                body,
                multiline,
            } => {
                self.push("for ");
                self.push(var);
                if let Some(words) = words {
                    self.push(" in");
                    for word in words {
                        self.push(" ");
                        self.word(word);
                    }
                }
                self.push("; do");
                if *multiline {
                    self.block(body);
                    self.push("done");
                } else {
                    self.body(body, "done");
                }
            }
            CommandKind::Case {
                word,
                arms,
                trailing,
                multiline,
            } => self.case_clause(word, arms, trailing, *multiline),
            CommandKind::Function {
                name,
                keyword,
                parens,
                body,
            } => {
                if *keyword {
                    self.push("function ");
                }
                self.push(name);
                if *parens || !*keyword {
                    self.push("()");
                }
                self.push(" ");
                self.command(body);
            }
        }
        for redirect in &command.redirects {
            self.push(" ");
            self.redirect(redirect);
        }
    }

    /// Body of a compound after its opening keyword, then the closing one.
    fn body(&mut self, body: &List, close: &str) {
        if inline(&[body]) {
            self.push(" ");
            self.inline_list(body);
        } else {
            self.block(body);
        }
        self.push(close);
    }

    fn if_clause(&mut self, branches: &[(List, List)], otherwise: Option<&List>) {
        let bodies: Vec<&List> = branches
            .iter()
            .map(|(_, body)| body)
            .chain(otherwise)
            .collect();
        let one_line = inline(&bodies);

        for (i, (cond, body)) in branches.iter().enumerate() {
            self.push(if i == 0 { "if" } else { "elif" });
            self.header(cond);
            self.push("then");
            self.branch(body, one_line);
        }
        if let Some(otherwise) = otherwise {
            self.push("else");
            self.branch(otherwise, one_line);
        }
        self.push("fi");
    }

    fn branch(&mut self, body: &List, one_line: bool) {
        if one_line {
            self.push(" ");
            self.inline_list(body);
        } else {
            self.block(body);
        }
    }

    fn case_clause(
        &mut self,
        word: &Word,
        arms: &[CaseArm],
        trailing: &[String],
        multiline: bool,
    ) {
        self.push("case ");
        self.word(word);
        self.push(" in");
        for arm in arms {
            for comment in &arm.comments {
                self.newline();
                self.push(comment);
            }
            if multiline {
                self.newline();
            } else {
                self.push(" ");
            }
            for (i, pattern) in arm.patterns.iter().enumerate() {
                if i > 0 {
                    self.push(" | ");
                }
                self.word(pattern);
            }
            self.push(")");
            if arm.body.stmts.is_empty() {
                self.push(" ;;");
            } else if inline(&[&arm.body]) {
                self.push(" ");
                self.inline_stmts(&arm.body);
                self.push(" ;;");
            } else {
                self.level += 1;
                self.stmts(&arm.body, true);
                self.newline();
                self.push(";;");
                self.level -= 1;
            }
        }
        for comment in trailing {
            self.newline();
            self.push(comment);
        }
        if multiline {
            self.newline();
        } else {
            self.push(" ");
        }
        self.push("esac");
    }

    fn simple(&mut self, items: &[SimpleItem]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                if item.continued {
                    self.push(" \\");
                    self.indented_newline();
                } else {
                    self.push(" ");
                }
            }
            match &item.kind {
                SimpleItemKind::Word(word) => self.word(word),
                SimpleItemKind::Redirect(redirect) => self.redirect(redirect),
            }
        }
    }

    fn redirect(&mut self, redirect: &Redirect) {
        if let Some(fd) = &redirect.fd {
            self.push(fd);
        }
        self.push(redirect.op.as_str());
        self.word(&redirect.target);
        if let Some(heredoc) = &redirect.heredoc {
            self.pending.push(heredoc.clone());
        }
    }

    /// `((` and `$((` would read back as arithmetic.
    fn space_before_subshell(&mut self, list: &List) {
        if starts_with_subshell(list) {
            self.push(" ");
        }
    }

    fn word(&mut self, word: &Word) {
        self.word_parts(&word.parts);
    }

    fn word_parts(&mut self, parts: &[WordPart]) {
        for part in parts {
            match part {
                WordPart::Lit(text) => self.push(text),
                WordPart::Quoted(inner) => {
                    self.push("\"");
                    self.word_parts(inner);
                    self.push("\"");
                }
                WordPart::CmdSubst(list) => {
                    self.push("$(");
                    if inline(&[list]) {
                        self.space_before_subshell(list);
                        self.inline_stmts(list);
                    } else {
                        self.block(list);
                    }
                    self.push(")");
                }
            }
        }
    }
}

/// No newline in the source and no comment that would swallow the rest of
/// the line.
fn inline(lists: &[&List]) -> bool {
    lists.iter().all(|list| !list.multiline && fits_inline(list))
}

fn fits_inline(list: &List) -> bool {
    list.stmts.iter().all(|stmt| stmt.comment.is_none())
}

fn starts_with_subshell(list: &List) -> bool {
    list.stmts
        .first()
        .and_then(|stmt| stmt.and_or.as_ref())
        .is_some_and(|and_or| {
            !and_or.first.bang && matches!(and_or.first.first.kind, CommandKind::Subshell(_))
        })
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    fn fmt(src: &str) -> String {
        print(&parse(src).unwrap())
    }

    #[test]
    fn collapses_whitespace_between_words() {
        assert_eq!(fmt("echo   hi  there"), "echo hi there\n");
        assert_eq!(fmt("a;b ;  c"), "a; b; c\n");
        assert_eq!(fmt("a &&b||  c | d"), "a && b || c | d\n");
    }

    #[test]
    fn drops_trailing_semicolon_and_keeps_background() {
        assert_eq!(fmt("a;"), "a\n");
        assert_eq!(fmt("a & b"), "a & b\n");
        assert_eq!(fmt("a &"), "a &\n");
    }

    #[test]
    fn redirects_have_no_space() {
        assert_eq!(fmt("cmd > /dev/null 2>& 1"), "cmd >/dev/null 2>&1\n");
        assert_eq!(fmt("{ a; } > out"), "{ a; } >out\n");
    }

    #[test]
    fn preserves_words_verbatim() {
        assert_eq!(
            fmt(r#"echo 'a   b' "c   $d" ${e:-f} $((1 + 2)) `date`"#),
            "echo 'a   b' \"c   $d\" ${e:-f} $((1 + 2)) `date`\n"
        );
    }

    #[test]
    fn reformats_command_substitutions() {
        assert_eq!(fmt("echo $( ls   -l |wc -l )"), "echo $(ls -l | wc -l)\n");
        assert_eq!(fmt("echo \"$(id  -u)\""), "echo \"$(id -u)\"\n");
    }

    #[test]
    fn one_line_compounds_stay_on_one_line() {
        assert_eq!(fmt("if a ;then b;else c ; fi"), "if a; then b; else c; fi\n");
        assert_eq!(fmt("for i in 1 2 ;do echo $i;done"), "for i in 1 2; do echo $i; done\n");
        assert_eq!(fmt("while true;do :;done"), "while true; do :; done\n");
        assert_eq!(fmt("( cd /tmp&&ls )"), "(cd /tmp && ls)\n");
        assert_eq!(
            fmt("case $x in a|b) echo ab;; *) echo other;; esac"),
            "case $x in a | b) echo ab ;; *) echo other ;; esac\n"
        );
        assert_eq!(fmt("f(){ echo hi;}"), "f() { echo hi; }\n");
    }

    #[test]
    fn multi_line_compounds_are_indented_with_tabs() {
        let src = "if [ -f x ]\nthen\n  echo yes\n      echo again\nfi";
        assert_eq!(fmt(src), "if [ -f x ]; then\n\techo yes\n\techo again\nfi\n");

        let src = "for f in a b\ndo\nif x; then\ny\nfi\ndone";
        assert_eq!(fmt(src), "for f in a b; do\n\tif x; then\n\t\ty\n\tfi\ndone\n");

        let src = "case $1 in\n  start)\n    run\n    ;;\n  *) usage ;;\nesac";
        assert_eq!(fmt(src), "case $1 in\nstart)\n\trun\n\t;;\n*) usage ;;\nesac\n");
    }

    #[test]
    fn continuations_indent_one_level() {
        assert_eq!(
            fmt("apt-get update \\\n    && apt-get install -y \\\n        curl \\\n   git"),
            "apt-get update &&\n\tapt-get install -y \\\n\tcurl \\\n\tgit\n"
        );
        assert_eq!(fmt("a &&\n\n  b"), "a &&\n\tb\n");
        assert_eq!(fmt("a |\n b"), "a |\n\tb\n");
    }

    #[test]
    fn subshell_at_start_of_substitution_keeps_its_space() {
        assert_eq!(fmt("echo $( (cd /src && make) )"), "echo $( (cd /src && make))\n");
        assert_eq!(fmt("( (a) ; b)"), "( (a); b)\n");
        assert_eq!(fmt("echo $(a; (b))"), "echo $(a; (b))\n");
        let once = fmt("x=$( (id) )");
        assert_eq!(fmt(&once), once);
    }

    #[test]
    fn continuation_after_operator_is_kept() {
        assert_eq!(
            fmt("apt-get update && \\\n    apt-get install -y curl"),
            "apt-get update &&\n\tapt-get install -y curl\n"
        );
        assert_eq!(fmt("a | \\\n b"), "a |\n\tb\n");
        assert_eq!(fmt("a || \\\n b"), "a ||\n\tb\n");
    }

    #[test]
    fn comments_after_operators_stay_on_continuation_lines() {
        assert_eq!(fmt("a &&\n# comment\nb"), "a &&\n\t# comment\n\tb\n");
        assert_eq!(fmt("a | # why\n  b"), "a |\n\t# why\n\tb\n");
    }

    #[test]
    fn comments_in_compound_headers_are_kept() {
        assert_eq!(
            fmt("for f in a b # list\ndo\necho $f\ndone"),
            "for f in a b; do\n\t# list\n\techo $f\ndone\n"
        );
        assert_eq!(
            fmt("case $1 in\n# start it\nstart) run ;;\n# anything else\n*) usage ;;\n# end\nesac"),
            "case $1 in\n# start it\nstart) run ;;\n# anything else\n*) usage ;;\n# end\nesac\n"
        );
        assert_eq!(fmt("f()\n# body\n{ a; }"), "f() {\n\t# body\n\ta\n}\n");
    }

    #[test]
    fn keeps_one_blank_line_and_comments() {
        assert_eq!(fmt("a\n\n\n\nb"), "a\n\nb\n");
        assert_eq!(fmt("\n\na"), "a\n");
        assert_eq!(fmt("# top\na   # after\nb"), "# top\na # after\nb\n");
    }

    #[test]
    fn heredoc_bodies_follow_their_line() {
        assert_eq!(
            fmt("cat <<EOF >  out\n  keep   spacing\nEOF\necho done"),
            "cat <<EOF >out\n  keep   spacing\nEOF\necho done\n"
        );
        assert_eq!(
            fmt("cat <<-END\n\tx\n\tEND"),
            "cat <<-END\n\tx\n\tEND\n"
        );
    }

    #[test]
    fn empty_program_prints_nothing() {
        assert_eq!(fmt(""), "");
        assert_eq!(fmt("\n\n"), "");
    }
}
