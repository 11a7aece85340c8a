mod common;
mod reminders;
