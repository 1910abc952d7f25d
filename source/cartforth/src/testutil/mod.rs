//! # Test Utilities
//!
//! Helpers for running "ui tests": forth fragments paired with the values
//! they are expected to print.
//!
//! The engines made here register one native word, `.`, which records each
//! value it pops into the engine's `Vec<i32>` host context.
//!
//! ## UI Tests
//!
//! Each line of a ui test is one of:
//!
//! * Configuration values for the engine, specified as "frontmatter comments".
//!   These must appear before any other non-comment lines. Currently accepted:
//!     * `( memory_size I32 )`
//!     * `( max_cycles U32 )`
//! * Comment lines. These are any lines just containing a `( ... )` style forth comment.
//! * Successful input lines, starting with `> ...`. Each one is passed to
//!   `interpret_source` on its own.
//! * Output lines, starting with `< ...`, listing the values `.` recorded
//!   while running the input line above, separated by whitespace.
//!     * Any successful input line can have zero or more output lines
//!     * If *no* output lines are specified, ANY output is accepted/ignored.
//!     * `<` alone expects no output at all.
//! * Unsuccessful input lines, starting with `x ...`.
//!     * This line is expected to return an `Err()`.
//!     * There is no way to specify which error yet
//!     * Unsuccessful input lines may not have any output lines
//!
//! ### Example
//!
//! ```text
//! ( memory_size 8192 )
//!
//! > : star 42 . ;
//! > star star
//! < 42 42
//! x starb
//! ```

use crate::{Engine, Error, Params};

/// An engine whose `.` word records values into `host_ctxt`.
pub fn recording_engine() -> Engine<Vec<i32>> {
    recording_engine_with(Params::default())
}

pub fn recording_engine_with(params: Params) -> Engine<Vec<i32>> {
    let mut engine = Engine::from_params(params, Vec::new()).unwrap();
    engine.register_native(".", 1, |vm, args| {
        vm.host_ctxt.push(args[0]);
        Ok(Vec::new())
    });
    engine
}

/// Run the given ui test against a new recording engine.
///
/// Does accept any/all/none of the configuration frontmatter (see above
/// for listing of frontmatter kinds)
pub fn blocking_runtest(contents: &str) {
    let tokd = tokenize(contents, true).unwrap();
    let mut engine = recording_engine_with(tokd.settings);
    steps_with(tokd.steps.as_slice(), &mut engine);
}

/// Run the given ui test against the given engine.
///
/// Does not accept ui-tests with frontmatter configuration (will panic)
pub fn blocking_runtest_with(engine: &mut Engine<Vec<i32>>, contents: &str) {
    let tokd = tokenize(contents, false).unwrap();
    steps_with(tokd.steps.as_slice(), engine);
}

fn check_output(res: Result<(), Error>, outcome: &Outcome, output: &[i32]) {
    println!("< {output:?}");
    match (res, outcome) {
        (Ok(()), Outcome::OkAnyOutput) => {}
        (Ok(()), Outcome::OkWithOutput(exp)) => {
            assert_eq!(output, exp.as_slice());
        }
        (Err(_e), Outcome::FatalError) => {}
        (res, exp) => {
            eprintln!("Error!");
            eprintln!("Expected: {exp:?}");
            match res {
                Ok(()) => eprintln!("Got: Ok, output {output:?}"),
                Err(e) => eprintln!("Got: {e}"),
            }
            panic!();
        }
    }
}

// Runs the given steps against the given engine.
//
// Panics on any mismatch
fn steps_with(steps: &[Step], engine: &mut Engine<Vec<i32>>) {
    for Step {
        input,
        output: outcome,
    } in steps
    {
        println!("> {input}");
        let res = engine.interpret_source(input, "ui-test");
        check_output(res, outcome, &engine.host_ctxt);
        engine.host_ctxt.clear();
    }
}

#[derive(Debug)]
enum Outcome {
    OkAnyOutput,
    OkWithOutput(Vec<i32>),
    FatalError,
}

#[derive(Debug)]
struct Step {
    input: String,
    output: Outcome,
}

#[derive(Default, Debug)]
struct Tokenized {
    settings: Params,
    steps: Vec<Step>,
}

fn parse_values(remain: &str) -> Vec<i32> {
    remain
        .split_whitespace()
        .map(|v| v.parse::<i32>().unwrap())
        .collect()
}

fn tokenize(contents: &str, allow_frontmatter: bool) -> Result<Tokenized, ()> {
    let mut output = Tokenized::default();
    let mut frontmatter_done = !allow_frontmatter;

    for line in contents.lines() {
        let line = line.trim_start();
        let (tok, remain) = match line.split_once(' ') {
            Some(t) => t,
            None if line == "<" => ("<", ""),
            None => continue,
        };

        match tok {
            ">" => {
                frontmatter_done = true;
                output.steps.push(Step {
                    input: remain.to_string(),
                    output: Outcome::OkAnyOutput,
                });
            }
            "<" => {
                frontmatter_done = true;
                let cur_step = output.steps.last_mut().unwrap();
                let values = parse_values(remain);
                match &mut cur_step.output {
                    Outcome::OkAnyOutput => {
                        cur_step.output = Outcome::OkWithOutput(values);
                    }
                    Outcome::OkWithOutput(o) => {
                        o.extend(values);
                    }
                    Outcome::FatalError => panic!("Fatal error can't set output"),
                }
            }
            "x" => {
                frontmatter_done = true;
                output.steps.push(Step {
                    input: remain.to_string(),
                    output: Outcome::FatalError,
                });
            }
            "(" => {
                let mut split = remain.split_whitespace();
                let mut is_comment = false;
                match split.next() {
                    Some("memory_size") => {
                        output.settings.memory_size =
                            split.next().unwrap().parse::<i32>().unwrap();
                    }
                    Some("max_cycles") => {
                        output.settings.max_cycles = split.next().unwrap().parse::<u32>().unwrap();
                    }
                    Some(_) => {
                        is_comment = true;
                    }
                    _ => panic!(),
                }
                if !is_comment {
                    assert!(!frontmatter_done, "Unexpected frontmatter settings!");
                    assert_eq!(Some(")"), split.next());
                }
            }
            _ => {}
        }
    }

    Ok(output)
}
