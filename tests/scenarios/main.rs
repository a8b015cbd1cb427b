//! Scenario tests driving the engine end to end with a scripted collaborator

mod helpers;

mod artifacts;
mod conditions;
mod dependencies;
mod end_to_end;
mod loading;
mod matching;
mod secrets;
