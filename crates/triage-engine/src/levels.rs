//! 优先级等级与护理安排
//!
//! 等级仅用于展示和超时统计，出队顺序只看年龄调整优先级。

use serde::Serialize;
use triage_core::{PriorityLevel, Specialty};

/// 护理安排建议
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarePlan {
    pub level: PriorityLevel,
    pub room_type: &'static str,
    pub staff_level: &'static str,
    pub equipment: Vec<&'static str>,
}

/// 按等级和专科给出护理安排
pub fn care_plan(level: PriorityLevel, specialty: Specialty) -> CarePlan {
    let (room_type, staff_level) = match level {
        PriorityLevel::Critical => ("Emergency Room", "Emergency Team"),
        PriorityLevel::Urgent => ("Urgent Care Room", "Urgent Care Team"),
        PriorityLevel::Moderate => ("Examination Room", "Nurse + Doctor"),
        PriorityLevel::Low => ("Consultation Room", "Nurse"),
    };

    let mut equipment = match level {
        PriorityLevel::Critical => vec!["Defibrillator", "Ventilator", "IV Supplies"],
        PriorityLevel::Urgent => vec!["IV Supplies", "Monitoring Equipment"],
        PriorityLevel::Moderate | PriorityLevel::Low => vec!["Basic Medical Supplies"],
    };

    equipment.extend(match specialty {
        Specialty::Cardiology => &["ECG Machine", "Blood Pressure Monitor"][..],
        Specialty::Neurology => &["Neurological Assessment Kit"][..],
        Specialty::Dermatology => &["Dermatoscope", "Skin Biopsy Kit"][..],
        Specialty::Orthopedics => &["X-ray Machine", "Splinting Supplies"][..],
        _ => &[][..],
    });

    CarePlan {
        level,
        room_type,
        staff_level,
        equipment,
    }
}
