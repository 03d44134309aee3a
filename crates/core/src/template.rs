//! Variable map rendering for AlimTalk templates.
//!
//! The provider substitutes `#{name}` placeholders in a pre-registered
//! template. This module only produces the flat `name -> value` map; it
//! never fails.

use std::collections::BTreeMap;

use chrono::FixedOffset;

use crate::attendance::TemplateType;
use crate::types::Timestamp;

pub const VAR_ACADEMY_NAME: &str = "academy_name";
pub const VAR_STUDENT_NAME: &str = "student_name";
pub const VAR_CLASS_NAME: &str = "class_name";
pub const VAR_SESSION_DATE: &str = "session_date";
pub const VAR_SESSION_TIME: &str = "session_time";
pub const VAR_ATTENDANCE_STATUS: &str = "attendance_status";
pub const VAR_TEACHER_NAME: &str = "teacher_name";

/// Typed inputs for one rendered message.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub academy_name: String,
    pub student_name: String,
    pub class_name: String,
    pub session_starts_at: Timestamp,
    pub template_type: TemplateType,
    pub teacher_name: String,
}

/// Human label inserted as `attendance_status`.
pub fn status_label(template_type: TemplateType) -> &'static str {
    match template_type {
        TemplateType::Absent => "absent",
        TemplateType::Late => "late",
        TemplateType::Excused => "excused",
    }
}

/// Render the variable map. Session date and time are shown in `tz`.
pub fn render_variables(ctx: &TemplateContext, tz: &FixedOffset) -> BTreeMap<String, String> {
    let starts_local = ctx.session_starts_at.with_timezone(tz);

    BTreeMap::from([
        (VAR_ACADEMY_NAME.to_string(), ctx.academy_name.clone()),
        (VAR_STUDENT_NAME.to_string(), ctx.student_name.clone()),
        (VAR_CLASS_NAME.to_string(), ctx.class_name.clone()),
        (
            VAR_SESSION_DATE.to_string(),
            starts_local.format("%Y-%m-%d").to_string(),
        ),
        (
            VAR_SESSION_TIME.to_string(),
            starts_local.format("%H:%M").to_string(),
        ),
        (
            VAR_ATTENDANCE_STATUS.to_string(),
            status_label(ctx.template_type).to_string(),
        ),
        (VAR_TEACHER_NAME.to_string(), ctx.teacher_name.clone()),
    ])
}
