//! Stroke accounting. The scorecard is a bus collaborator: it counts
//! strokes and penalties from events rather than being called directly by
//! the progression logic, which only reads totals back.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;

use crate::events::{EventBus, EventType, SubscriptionId};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoleScore {
    /// 1-based hole number.
    pub hole: u32,
    pub par: u32,
    pub strokes: u32,
}

#[derive(Debug)]
pub struct Scorecard {
    pars: Vec<u32>,
    strokes: Vec<u32>,
    penalties: Vec<u32>,
    current_hole: usize,
}

impl Scorecard {
    pub fn new(pars: Vec<u32>) -> Self {
        let holes = pars.len();
        Self {
            pars,
            strokes: vec![0; holes],
            penalties: vec![0; holes],
            current_hole: 0,
        }
    }

    /// Wire the scorecard to the bus: ball:hit counts a stroke,
    /// hazard:detected a penalty stroke, hole:started moves the cursor.
    pub fn attach(card: Rc<RefCell<Scorecard>>, bus: &EventBus) -> Vec<SubscriptionId> {
        let mut ids = Vec::new();

        let c = card.clone();
        ids.push(bus.subscribe(EventType::BallHit, Some("Scorecard"), move |_| {
            c.borrow_mut().record_stroke();
            Ok(())
        }));

        let c = card.clone();
        ids.push(bus.subscribe(EventType::HazardDetected, Some("Scorecard"), move |_| {
            c.borrow_mut().record_penalty();
            Ok(())
        }));

        let c = card;
        ids.push(bus.subscribe(EventType::HoleStarted, Some("Scorecard"), move |event| {
            let index = event
                .data
                .get("holeIndex")
                .and_then(Value::as_u64)
                .ok_or_else(|| anyhow::anyhow!("hole:started without holeIndex"))?;
            c.borrow_mut().set_current_hole(index as usize);
            Ok(())
        }));

        ids
    }

    fn record_stroke(&mut self) {
        if let Some(count) = self.strokes.get_mut(self.current_hole) {
            *count += 1;
        }
    }

    fn record_penalty(&mut self) {
        if let Some(count) = self.penalties.get_mut(self.current_hole) {
            *count += 1;
        }
    }

    fn set_current_hole(&mut self, index: usize) {
        if index < self.pars.len() {
            self.current_hole = index;
        } else {
            tracing::warn!(index, holes = self.pars.len(), "hole index out of range");
        }
    }

    pub fn current_hole(&self) -> usize {
        self.current_hole
    }

    /// Strokes plus penalties for one hole. None when out of range.
    pub fn hole_strokes(&self, index: usize) -> Option<u32> {
        match (self.strokes.get(index), self.penalties.get(index)) {
            (Some(strokes), Some(penalties)) => Some(strokes + penalties),
            _ => {
                tracing::warn!(index, "hole_strokes: no such hole");
                None
            }
        }
    }

    pub fn current_hole_strokes(&self) -> u32 {
        self.hole_strokes(self.current_hole).unwrap_or(0)
    }

    pub fn total_strokes(&self) -> u32 {
        (0..self.pars.len())
            .filter_map(|i| self.hole_strokes(i))
            .sum()
    }

    pub fn breakdown(&self) -> Vec<HoleScore> {
        self.pars
            .iter()
            .enumerate()
            .map(|(i, &par)| HoleScore {
                hole: i as u32 + 1,
                par,
                strokes: self.hole_strokes(i).unwrap_or(0),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::payload;
    use serde_json::json;

    fn wired() -> (EventBus, Rc<RefCell<Scorecard>>) {
        let bus = EventBus::new(32);
        let card = Rc::new(RefCell::new(Scorecard::new(vec![2, 3, 3])));
        Scorecard::attach(card.clone(), &bus);
        (bus, card)
    }

    #[test]
    fn counts_strokes_from_ball_hit_events() {
        let (bus, card) = wired();
        bus.publish(EventType::BallHit, payload(json!({"power": 2.0})), None);
        bus.publish(EventType::BallHit, payload(json!({"power": 1.0})), None);
        assert_eq!(card.borrow().current_hole_strokes(), 2);
        assert_eq!(card.borrow().total_strokes(), 2);
    }

    #[test]
    fn hazard_adds_a_penalty_stroke() {
        let (bus, card) = wired();
        bus.publish(EventType::BallHit, payload(json!({})), None);
        bus.publish(EventType::HazardDetected, payload(json!({})), None);
        assert_eq!(card.borrow().current_hole_strokes(), 2);
    }

    #[test]
    fn hole_started_moves_the_cursor() {
        let (bus, card) = wired();
        bus.publish(EventType::BallHit, payload(json!({})), None);
        bus.publish(
            EventType::HoleStarted,
            payload(json!({"holeIndex": 1, "hole": 2, "par": 3})),
            None,
        );
        bus.publish(EventType::BallHit, payload(json!({})), None);
        bus.publish(EventType::BallHit, payload(json!({})), None);

        let card = card.borrow();
        assert_eq!(card.hole_strokes(0), Some(1));
        assert_eq!(card.hole_strokes(1), Some(2));
        assert_eq!(card.total_strokes(), 3);
    }

    #[test]
    fn breakdown_covers_every_hole() {
        let (bus, card) = wired();
        bus.publish(EventType::BallHit, payload(json!({})), None);
        let breakdown = card.borrow().breakdown();
        assert_eq!(breakdown.len(), 3);
        assert_eq!(breakdown[0].hole, 1);
        assert_eq!(breakdown[0].strokes, 1);
        assert_eq!(breakdown[2].strokes, 0);
    }

    #[test]
    fn out_of_range_queries_are_sentinels_not_errors() {
        let card = Scorecard::new(vec![2]);
        assert_eq!(card.hole_strokes(5), None);
    }
}
