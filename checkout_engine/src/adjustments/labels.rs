use crate::{
    db_types::AdjustmentType,
    traits::{AdjustmentLabeler, LabelParams},
};

/// Plain English labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLabeler;

impl AdjustmentLabeler for DefaultLabeler {
    fn label(&self, kind: AdjustmentType, params: &LabelParams) -> String {
        match kind {
            AdjustmentType::ReusablePackaging => match params.units {
                Some(units) => format!("Reusable packaging deposit ({})", units_phrase(units)),
                None => "Reusable packaging deposit".to_string(),
            },
            AdjustmentType::GiveBack => match params.units {
                Some(units) => format!("Returned packaging credit ({})", units_phrase(units)),
                None => "Returned packaging credit".to_string(),
            },
            AdjustmentType::Promotion => match &params.variant_code {
                Some(code) => format!("Promotion on {code}"),
                None => "Promotion".to_string(),
            },
            AdjustmentType::Tax => "Tax".to_string(),
        }
    }
}

fn units_phrase(units: f64) -> String {
    if (units - 1.0).abs() < f64::EPSILON {
        "1 unit".to_string()
    } else {
        format!("{units} units")
    }
}
