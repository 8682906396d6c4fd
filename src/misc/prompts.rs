use std::collections::BTreeMap;

use crate::LisaError;

const PEDESTRIAN_RULES: &str = "
- People who are walking or riding kick scooters (including electric kick scooters), segways, skateboards, etc. are labeled as pedestrians.
- People inside other vehicles are not labeled, except for people standing on the top of cars/trucks or standing on flatbeds of trucks.
- A person riding a bicycle is not labeled as a pedestrian, but labeled as a cyclist instead.
- Mannequins, statues, billboards, posters, or reflections of people are not labeled.
- Include small child or carrying small items (smaller than 2m in size such as umbrella or small handbag or a sign).
- Include small mobility devices like a kick scooter (including electric kick scooter), a segway, a skateboard, etc
- If the pedestrian is carrying an object larger than 2m, or pushing a bike or shopping cart, the bounding box does not include the additional object.
- If the pedestrian is pushing a stroller with a child in it, separate bounding boxes are created for the pedestrian and the child. The stroller is not included in the child bounding box.
- If pedestrians overlap each other, they are labeled as separate objects. If they overlap then the bounding boxes can overlap as well.
";

const PEDESTRIAN_CHECKLIST: &str = "
Output segmentation masks for pedestrians with:
1. Label visible pedestrians.
2. Do not label if pedestrian identity is unclear.
3. Label people walking or on scooters, segways, skateboards.
4. Do not label people inside vehicles, unless on top/flatbeds.
5. Cyclists are not labeled as pedestrians.
6. Ignore mannequins, posters, reflections, etc.
7. Use one box if pedestrian carries small items (<2m) or a child.
8. Label scooter/segway/skateboard riders with one box.
9. Exclude large items (>2m) or pushed carts/bikes from box.
10. Use separate boxes for pedestrian and child in stroller; exclude stroller.
11. Overlapping pedestrians get separate (possibly overlapping) boxes.
";

const PEDESTRIAN: &str = "
pedestrian
";

const EMPTY: &str = "
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub id: u32,
    pub text: &'static str,
}

/// Instruction templates keyed by the run's `prompt_number`.
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    templates: BTreeMap<u32, PromptTemplate>,
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptRegistry {
    pub fn builtin() -> Self {
        Self::from_iter([
            (1, PEDESTRIAN_RULES),
            (2, PEDESTRIAN_CHECKLIST),
            (3, PEDESTRIAN),
            (4, EMPTY),
        ])
    }

    pub fn get(&self, id: u32) -> Result<&PromptTemplate, LisaError> {
        self.templates.get(&id).ok_or_else(|| {
            LisaError::config(format!(
                "Unknown prompt id {id}. Available: {:?}",
                self.ids()
            ))
        })
    }

    pub fn ids(&self) -> Vec<u32> {
        self.templates.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl FromIterator<(u32, &'static str)> for PromptRegistry {
    fn from_iter<I: IntoIterator<Item = (u32, &'static str)>>(iter: I) -> Self {
        Self {
            templates: iter
                .into_iter()
                .map(|(id, text)| (id, PromptTemplate { id, text }))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_four_templates() {
        let r = PromptRegistry::builtin();
        assert_eq!(r.ids(), vec![1, 2, 3, 4]);
        assert_eq!(r.get(3).unwrap().text.trim(), "pedestrian");
        assert!(r.get(4).unwrap().text.trim().is_empty());
        assert!(r.get(2).unwrap().text.contains("11. Overlapping pedestrians"));
    }

    #[test]
    fn unknown_id_is_configuration_error() {
        let r = PromptRegistry::builtin();
        let err = r.get(9).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Unknown prompt id 9"));
    }

    #[test]
    fn custom_registry() {
        let r: PromptRegistry = [(7, "cars")].into_iter().collect();
        assert_eq!(r.len(), 1);
        assert_eq!(r.get(7).unwrap().id, 7);
    }
}
