//! Reply texts and button layouts for each stage.

use crate::tag::{Tag, encode_indexed, encode_tag};
use crate::transport::{Action, MenuOption, Reply};
use deal_courier_crm::{CrmUser, Deal, Task};
use regex::Regex;

const RESTART_FOOTER: &str = "Send <code>/start</code> to start over.";
const SUPPORT_FOOTER: &str = "Please try again or contact support.";

/// Most item buttons a list menu carries. Telegram rejects inline keyboards
/// much beyond a hundred buttons.
pub const MAX_LIST_OPTIONS: usize = 50;

/// Session-wide rendering options.
#[derive(Debug, Clone, Default)]
pub struct DialogOptions {
    /// Removed from task titles when they are shown as buttons.
    pub task_label_strip: Option<Regex>,
}

impl DialogOptions {
    /// Builds options from a task-title suffix pattern; an empty pattern
    /// keeps titles as they are.
    pub fn new(task_label_strip: &str) -> Result<Self, regex::Error> {
        let task_label_strip = if task_label_strip.is_empty() {
            None
        } else {
            Some(Regex::new(task_label_strip)?)
        };
        Ok(Self { task_label_strip })
    }

    /// Returns the button label for a task.
    #[must_use]
    pub fn task_label(&self, task: &Task) -> String {
        let Some(strip) = &self.task_label_strip else {
            return task.title.clone();
        };
        let label = strip.replace_all(&task.title, "");
        let label = label.trim();
        if label.is_empty() {
            task.title.clone()
        } else {
            label.to_string()
        }
    }
}

/// Escapes text for an HTML-formatted reply.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub(crate) fn start(user: &CrmUser) -> Reply {
    Reply::with_options(
        format!(
            "Hello, {}.\nChoose an action.",
            escape_html(&user.display_name())
        ),
        vec![MenuOption::new("Show open deals", Action::ListDeals, "")],
    )
}

pub(crate) fn no_deals() -> Reply {
    Reply::text("No open deals found.")
}

pub(crate) fn deal_list(deals: &[Deal], tag: Tag) -> Reply {
    let options = (0u32..)
        .zip(deals.iter().take(MAX_LIST_OPTIONS))
        .map(|(index, deal)| {
            MenuOption::new(&deal.title, Action::SelectDeal, encode_indexed(tag, index))
        })
        .collect();
    Reply::with_options(list_heading("Choose a deal:", deals.len(), "deals"), options)
}

/// Notes a truncated list under its prompt. Lists arrive most recent first.
fn list_heading(prompt: &str, total: usize, items: &str) -> String {
    if total > MAX_LIST_OPTIONS {
        format!("{prompt}\n<i>Showing the first {MAX_LIST_OPTIONS} of {total} {items}.</i>")
    } else {
        prompt.to_string()
    }
}

pub(crate) fn deal_actions(deal: &Deal, tag: Tag) -> Reply {
    let payload = encode_tag(tag);
    Reply::with_options(
        format!(
            "Deal: <i>{}</i>\nStage: <i>{}</i>\n\nChoose an action:",
            escape_html(&deal.title),
            escape_html(deal.stage().label())
        ),
        vec![
            MenuOption::new("Add a comment", Action::WriteComment, payload.clone()),
            MenuOption::new("Show open tasks", Action::ListTasks, payload),
            MenuOption::new("Back", Action::ListDeals, ""),
        ],
    )
}

pub(crate) fn comment_prompt(deal: &Deal) -> Reply {
    Reply::text(format!(
        "Write a comment for <i>{}</i>:",
        escape_html(&deal.title)
    ))
}

pub(crate) fn comment_added(deal: &Deal, comment: &str) -> Reply {
    Reply::text(format!(
        "Comment \"{}\" added to deal <i>{}</i>.",
        escape_html(comment),
        escape_html(&deal.title)
    ))
}

pub(crate) fn offer_task_completion(deal_tag: Tag) -> Reply {
    Reply::with_options(
        "Do you need to close a task for this deal?",
        vec![
            MenuOption::new("Yes", Action::ListTasks, encode_tag(deal_tag)),
            MenuOption::new("No", Action::Start, ""),
        ],
    )
}

pub(crate) fn no_tasks() -> Reply {
    Reply::text("No open tasks.")
}

pub(crate) fn task_list(
    options: &DialogOptions,
    tasks: &[Task],
    tasks_tag: Tag,
    deal_tag: Tag,
) -> Reply {
    let mut buttons: Vec<MenuOption> = (0u32..)
        .zip(tasks.iter().take(MAX_LIST_OPTIONS))
        .map(|(index, task)| {
            MenuOption::new(
                options.task_label(task),
                Action::CompleteTask,
                encode_indexed(tasks_tag, index),
            )
        })
        .collect();
    buttons.push(MenuOption::new(
        "Back",
        Action::SelectDeal,
        encode_tag(deal_tag),
    ));
    Reply::with_options(
        list_heading("Choose a task to complete:", tasks.len(), "tasks"),
        buttons,
    )
}

pub(crate) fn task_completed(task: &Task) -> Reply {
    Reply::text(format!(
        "Task <i>{}</i> completed.",
        escape_html(&task.title)
    ))
}

pub(crate) fn text_not_expected() -> Reply {
    Reply::text(format!("I was not expecting a message.\n\n{RESTART_FOOTER}"))
}

pub(crate) fn out_of_order() -> Reply {
    Reply::text(format!(
        "This action is not available right now.\n\n{RESTART_FOOTER}"
    ))
}

pub(crate) fn invalid_selection() -> Reply {
    Reply::text(format!(
        "This selection is no longer valid.\n\n{RESTART_FOOTER}"
    ))
}

pub(crate) fn internal_error() -> Reply {
    Reply::text(format!("Something went wrong.\n\n{RESTART_FOOTER}"))
}

pub(crate) fn crm_failure(operation: &str, details: &str) -> Reply {
    let summary = details.lines().next().unwrap_or_default();
    Reply::text(format!(
        "Could not {operation}: {}\n\n{SUPPORT_FOOTER}",
        escape_html(summary)
    ))
}
