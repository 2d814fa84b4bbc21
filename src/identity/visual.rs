use serde::Serialize;

use super::dna::MusicalDna;
use crate::stats;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticleBehavior {
    Chaotic,
    Harmonic,
    #[default]
    Orbital,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDynamics {
    Turbulent,
    Transitional,
    #[default]
    Laminar,
}

impl std::fmt::Display for FlowDynamics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlowDynamics::Turbulent => "turbulent",
            FlowDynamics::Transitional => "transitional",
            FlowDynamics::Laminar => "laminar",
        };
        f.write_str(name)
    }
}

/// Presentation parameters derived from the current DNA. Recomputed every
/// tick and never stored between ticks.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VisualMapping {
    pub curvature_factor: f32,
    pub particle_density: f32,
    pub particle_behavior: ParticleBehavior,
    pub color_evolution_speed: f32,
    pub geometric_complexity: f32,
    pub flow_dynamics: FlowDynamics,
    pub symmetry_breaking: f32,
    pub spiral_speed: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulse_intensity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_intensity: Option<f32>,
    pub resonance_frequencies: [f32; 8],
}

impl VisualMapping {
    pub fn from_dna(dna: &MusicalDna) -> Self {
        let melodic_complexity =
            dna.melodic.melodic_range * stats::std_dev(&dna.melodic.interval_signature);
        let mut curvature_factor = 0.5 + melodic_complexity * 1.5;
        if let Some(tonal) = dna.extras.tonal_complexity {
            curvature_factor = (curvature_factor + 0.5 + tonal * 0.5) * 0.5;
        }

        let rhythmic_complexity = dna.rhythmic.rhythmic_complexity;
        let particle_behavior = if rhythmic_complexity > 0.6 {
            ParticleBehavior::Chaotic
        } else if dna.harmonic.consonance_ratio > 0.7 {
            ParticleBehavior::Harmonic
        } else {
            ParticleBehavior::Orbital
        };

        let structural = (dna.harmonic.harmonic_richness
            + rhythmic_complexity
            + dna.extras.phrase_complexity.unwrap_or(0.0))
            / 3.0;

        let flow_dynamics = if dna.dynamic.dynamic_range > 0.7 {
            FlowDynamics::Turbulent
        } else if dna.dynamic.energy_variance > 0.5 {
            FlowDynamics::Transitional
        } else {
            FlowDynamics::Laminar
        };

        let symmetry_breaking = (dna.melodic.direction_bias.abs()
            + dna.rhythmic.syncopation_index
            + dna.structural.surprise_quotient)
            / 3.0;

        let mut resonance_frequencies = [0.0; 8];
        resonance_frequencies.copy_from_slice(&dna.tonal.chromatic_signature[..8]);

        Self {
            curvature_factor,
            particle_density: 0.3 + dna.harmonic.harmonic_richness * 0.7,
            particle_behavior,
            color_evolution_speed: 0.3 + (1.0 - dna.tonal.scale_stability) * 1.7,
            geometric_complexity: 0.5 + structural * 2.0,
            flow_dynamics,
            symmetry_breaking,
            spiral_speed: 0.5 + rhythmic_complexity,
            pulse_intensity: dna.extras.beat_strength.map(|s| 0.2 + s * 0.8),
            overall_intensity: dna.extras.rms_energy_mean.map(|e| 0.1 + e * 0.9),
            resonance_frequencies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_dna_maps_to_calm_defaults() {
        let dna = MusicalDna::default();
        let visual = VisualMapping::from_dna(&dna);
        assert_eq!(visual.curvature_factor, 0.5);
        assert_eq!(visual.particle_behavior, ParticleBehavior::Orbital);
        assert_eq!(visual.flow_dynamics, FlowDynamics::Laminar);
        assert!((visual.color_evolution_speed - 2.0).abs() < 1e-6);
        assert_eq!(visual.pulse_intensity, None);
        assert_eq!(visual.overall_intensity, None);
    }

    #[test]
    fn busy_rhythm_is_chaotic_and_fast() {
        let mut dna = MusicalDna::default();
        dna.rhythmic.rhythmic_complexity = 0.8;
        dna.harmonic.consonance_ratio = 0.9;
        dna.dynamic.dynamic_range = 0.8;
        let visual = VisualMapping::from_dna(&dna);
        assert_eq!(visual.particle_behavior, ParticleBehavior::Chaotic);
        assert_eq!(visual.flow_dynamics, FlowDynamics::Turbulent);
        assert!((visual.spiral_speed - 1.3).abs() < 1e-6);
    }

    #[test]
    fn optional_descriptors_only_apply_when_present() {
        let mut dna = MusicalDna::default();
        let without = VisualMapping::from_dna(&dna);
        dna.extras.tonal_complexity = Some(1.0);
        dna.extras.beat_strength = Some(0.5);
        dna.extras.rms_energy_mean = Some(1.0);
        let with = VisualMapping::from_dna(&dna);
        assert!(with.curvature_factor > without.curvature_factor);
        assert!((with.pulse_intensity.unwrap() - 0.6).abs() < 1e-6);
        assert!((with.overall_intensity.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn resonance_copies_leading_chroma_bins() {
        let mut dna = MusicalDna::default();
        dna.tonal.chromatic_signature[3] = 0.4;
        dna.tonal.chromatic_signature[10] = 0.6;
        let visual = VisualMapping::from_dna(&dna);
        assert_eq!(visual.resonance_frequencies[3], 0.4);
        assert_eq!(visual.resonance_frequencies.iter().sum::<f32>(), 0.4);
    }
}
