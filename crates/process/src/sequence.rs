//! Sequential workflow syntax.
//!
//! Three spellings of the same thing, all plain nested [`Process::bind`]:
//!
//! ```ignore
//! // fluent builder
//! Process::sequence(wait_for_order())
//!     .then(|order| charge(order))
//!     .map(|receipt| receipt.id)
//!     .finish();
//!
//! // pipe: each step receives the previous value
//! process_pipe!(wait_for_order(), |order| charge(order), |receipt| ship(receipt));
//!
//! // do-notation: named intermediate values stay in scope
//! process_do! {
//!     let order = wait_for_order();
//!     let receipt = charge(order.clone());
//!     Process::set_state(move |s: Orders| s.record(&order));
//!     Process::pure(receipt)
//! }
//! ```
//!
//! In `process_do!` every `let` binding is cloned into the steps after it, so
//! bound values only need to be `Clone` (which `ProcessData` already requires).

use procflow_core::ProcessData;

use crate::process::Process;

/// Fluent builder over [`Process::bind`].
#[derive(Debug, Clone)]
pub struct Sequence<I, S, E, R> {
    process: Process<I, S, E, R>,
}

impl<I, S, E, R> Process<I, S, E, R>
where
    I: ProcessData,
    S: ProcessData,
    E: ProcessData,
    R: ProcessData,
{
    /// Start a sequence with `first`.
    pub fn sequence(first: Self) -> Sequence<I, S, E, R> {
        Sequence { process: first }
    }
}

impl<I, S, E, R> Sequence<I, S, E, R>
where
    I: ProcessData,
    S: ProcessData,
    E: ProcessData,
    R: ProcessData,
{
    pub fn then<R2, F>(self, f: F) -> Sequence<I, S, E, R2>
    where
        R2: ProcessData,
        F: Fn(R) -> Process<I, S, E, R2> + Send + Sync + 'static,
    {
        Sequence {
            process: self.process.bind(f),
        }
    }

    pub fn map<R2, F>(self, f: F) -> Sequence<I, S, E, R2>
    where
        R2: ProcessData,
        F: Fn(R) -> R2 + Send + Sync + 'static,
    {
        Sequence {
            process: self.process.map(f),
        }
    }

    pub fn finish(self) -> Process<I, S, E, R> {
        self.process
    }
}

impl<I, S, E, R> From<Sequence<I, S, E, R>> for Process<I, S, E, R> {
    fn from(sequence: Sequence<I, S, E, R>) -> Self {
        sequence.process
    }
}

/// Left-to-right chain of [`Process::bind`].
///
/// `process_pipe!(p, f, g)` is `p.bind(f).bind(g)`.
#[macro_export]
macro_rules! process_pipe {
    ($process:expr $(, $f:expr)* $(,)?) => {{
        let process = $process;
        $( let process = process.bind($f); )*
        process
    }};
}

/// Do-notation for processes.
///
/// Statements are `let name = <process>;` (bind the step's value) or
/// `<process>;` (discard it); the last item is the process that produces the
/// overall result.
#[macro_export]
macro_rules! process_do {
    (@steps [$($bound:ident)*] let $name:ident = $step:expr; $($rest:tt)+) => {
        $crate::Process::bind(
            $crate::process_do!(@scoped [$($bound)*] $step),
            move |$name| {
                $crate::process_do!(@scoped [$($bound)*] $crate::process_do!(@steps [$($bound)* $name] $($rest)+))
            },
        )
    };
    (@steps [$($bound:ident)*] $step:expr; $($rest:tt)+) => {
        $crate::Process::bind(
            $crate::process_do!(@scoped [$($bound)*] $step),
            move |_| {
                $crate::process_do!(@scoped [$($bound)*] $crate::process_do!(@steps [$($bound)*] $($rest)+))
            },
        )
    };
    (@steps [$($bound:ident)*] $last:expr $(;)?) => {
        $crate::process_do!(@scoped [$($bound)*] $last)
    };
    // Evaluate `$body` against fresh clones of the bound values, so moves in
    // one step leave the originals for the steps after it.
    (@scoped [$($bound:ident)*] $body:expr) => {{
        $(
            #[allow(unused_variables)]
            let $bound = ::core::clone::Clone::clone(&$bound);
        )*
        $body
    }};
    ($($body:tt)+) => {
        $crate::process_do!(@steps [] $($body)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProcessStateKind;
    use procflow_core::InstanceId;

    type P<R> = Process<InstanceId, Vec<String>, String, R>;

    fn wait_word() -> P<String> {
        Process::wait_for_event(|word: &String| Some(Ok(word.clone())))
    }

    fn feed<R: ProcessData>(process: &P<R>, words: &[&str]) -> crate::ProcessState<Vec<String>, String, R> {
        let (_, mut node) = process.run(&InstanceId::with_key("words", "1"), Vec::new());
        for word in words {
            if let Some((_, next)) = node.offer(&word.to_string()) {
                node = next;
            }
        }
        node
    }

    #[test]
    fn builder_desugars_to_bind() {
        let process: P<String> = Process::sequence(wait_word())
            .then(|first| wait_word().map(move |second| format!("{first} {second}")))
            .map(|sentence| sentence.to_uppercase())
            .finish();

        let node = feed(&process, &["hello"]);
        assert_eq!(node.kind(), ProcessStateKind::InProgress);
        assert_eq!(feed(&process, &["hello", "world"]).value().map(String::as_str), Some("HELLO WORLD"));
    }

    #[test]
    fn do_notation_keeps_earlier_bindings_in_scope() {
        let process: P<usize> = process_do! {
            let first = wait_word();
            let second = wait_word();
            Process::set_state(move |mut seen: Vec<String>| {
                seen.push(first.clone());
                seen.push(second.clone());
                seen
            });
            let third = wait_word();
            Process::pure(first.len() + second.len() + third.len())
        };

        let node = feed(&process, &["a", "bb", "ccc"]);
        assert_eq!(node.value(), Some(&6));
        assert_eq!(node.state(), &vec!["a".to_string(), "bb".to_string()]);
    }

    #[test]
    fn pipe_matches_nested_bind() {
        let piped: P<usize> = process_pipe!(
            wait_word(),
            |a: String| wait_word().map(move |b| format!("{a}{b}")),
            |ab: String| Process::pure(ab.len()),
        );
        let nested: P<usize> = wait_word()
            .bind(|a: String| wait_word().map(move |b| format!("{a}{b}")))
            .bind(|ab: String| Process::pure(ab.len()));

        let words = ["ab", "cde"];
        assert_eq!(feed(&piped, &words).value(), Some(&5));
        assert_eq!(feed(&piped, &words).value(), feed(&nested, &words).value());
    }

    #[test]
    fn sequence_converts_into_a_process() {
        let process: P<String> = Process::sequence(wait_word()).into();
        assert_eq!(feed(&process, &["x"]).value().map(String::as_str), Some("x"));
    }
}
